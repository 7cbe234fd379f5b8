//! Tests for intrinsic function detection and parsing of template JSON into
//! expressions.

use cfnsmith::app::cfn_intrinsic_functions::{
    detect_intrinsic_function, sub_placeholders, Expression, IntrinsicFunctionType,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn resources(name: &str) -> bool {
    matches!(name, "MyVpc" | "PrivSubnetA" | "ElasticLoadBalancer")
}

#[test]
fn test_comprehensive_intrinsic_function_detection() {
    let cases = [
        (json!({"Ref": "MyVpc"}), IntrinsicFunctionType::Ref),
        (json!({"Fn::GetAtt": ["MyVpc", "CidrBlock"]}), IntrinsicFunctionType::GetAtt),
        (
            json!({"Fn::FindInMap": ["AzMap", {"Ref": "AWS::Region"}, "AMI"]}),
            IntrinsicFunctionType::FindInMap,
        ),
        (json!({"Fn::Join": ["", ["a", "b"]]}), IntrinsicFunctionType::Join),
        (json!({"Fn::Select": [0, ["a"]]}), IntrinsicFunctionType::Select),
        (json!({"Fn::Sub": "${AWS::StackName}-vpc"}), IntrinsicFunctionType::Sub),
        (json!({"Condition": "IsProd"}), IntrinsicFunctionType::Condition),
        (json!({"Fn::If": ["IsProd", "a", "b"]}), IntrinsicFunctionType::If),
        (json!({"Fn::GetAZs": ""}), IntrinsicFunctionType::GetAZs),
        (json!({"Fn::Base64": "hello"}), IntrinsicFunctionType::Base64),
        (json!({"Fn::Equals": ["a", "b"]}), IntrinsicFunctionType::Equals),
        (json!({"Fn::And": [{"Condition": "A"}, {"Condition": "B"}]}), IntrinsicFunctionType::And),
        (json!({"Fn::Or": [{"Condition": "A"}, {"Condition": "B"}]}), IntrinsicFunctionType::Or),
        (json!({"Fn::Not": [{"Condition": "A"}]}), IntrinsicFunctionType::Not),
    ];

    for (value, expected) in cases {
        assert_eq!(detect_intrinsic_function(&value), Some(expected), "{}", value);
    }
}

#[test]
fn test_non_intrinsic_values() {
    assert_eq!(detect_intrinsic_function(&json!("MyVpc")), None);
    assert_eq!(detect_intrinsic_function(&json!(["Ref", "MyVpc"])), None);
    assert_eq!(detect_intrinsic_function(&json!({"Key": "Name"})), None);
    // Two keys make a plain map even when one is a function name
    assert_eq!(
        detect_intrinsic_function(&json!({"Ref": "MyVpc", "Extra": 1})),
        None
    );
    assert_eq!(detect_intrinsic_function(&json!({"Fn::ImportValue": "Shared"})), None);
}

#[test]
fn test_ref_classification() {
    let vpc = Expression::from_value(&json!({"Ref": "MyVpc"}), &resources).unwrap();
    assert_eq!(vpc, Expression::resource_ref("MyVpc"));

    let region = Expression::from_value(&json!({"Ref": "AWS::Region"}), &resources).unwrap();
    assert_eq!(region, Expression::param_ref("AWS::Region"));
}

#[test]
fn test_parse_network_property_values() {
    let health_check = json!({
        "Target": {"Fn::Join": ["", ["HTTPS:", {"Ref": "WebServerPort"}, "/"]]},
        "HealthyThreshold": "3",
        "Interval": 30
    });
    let parsed = Expression::from_value(&health_check, &resources).unwrap();
    assert_eq!(
        parsed,
        Expression::map([
            (
                "Target",
                Expression::join(
                    "",
                    vec![
                        "HTTPS:".into(),
                        Expression::param_ref("WebServerPort"),
                        "/".into()
                    ]
                )
            ),
            ("HealthyThreshold", Expression::string("3")),
            ("Interval", Expression::integer(30)),
        ])
    );
    assert_eq!(parsed.to_value(), health_check);

    let short_get_att = json!({"Fn::GetAtt": "PrivSubnetA.SubnetId"});
    assert_eq!(
        Expression::from_value(&short_get_att, &resources).unwrap(),
        Expression::get_att("PrivSubnetA", "SubnetId")
    );
}

#[test]
fn test_referenced_resources() {
    let value = json!({
        "Fn::If": [
            "IsProd",
            {"Fn::GetAtt": ["ElasticLoadBalancer", "DNSName"]},
            {"Fn::Sub": ["${MyVpc}-${Name}", {"Name": {"Ref": "PrivSubnetA"}}]}
        ]
    });
    let expr = Expression::from_value(&value, &resources).unwrap();
    assert_eq!(
        expr.referenced_resources(),
        vec!["ElasticLoadBalancer", "MyVpc", "PrivSubnetA"]
    );
    assert_eq!(sub_placeholders("${MyVpc}-${!Literal}-${Name}"), vec!["MyVpc", "Name"]);
}

#[test]
fn test_malformed_functions_are_rejected() {
    let bad = [
        json!({"Fn::GetAtt": ["OnlyOne"]}),
        json!({"Fn::GetAtt": "NoDot"}),
        json!({"Fn::Select": [0]}),
        json!({"Fn::FindInMap": ["AzMap", "us-east-1a"]}),
        json!({"Ref": 42}),
        json!(1.5),
        json!(null),
    ];
    for value in bad {
        assert!(Expression::from_value(&value, &resources).is_err(), "{}", value);
    }
}
