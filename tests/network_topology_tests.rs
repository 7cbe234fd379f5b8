//! End-to-end compiles of the VPC network topology.

mod common;

use cfnsmith::app::cfn_dag::DependencyGraph;
use cfnsmith::app::cfn_errors::{DiagnosticKind, ReferentKind};
use cfnsmith::app::cfn_intrinsic_functions::Expression;
use cfnsmith::app::cfn_resources::ResourceDecl;
use cfnsmith::{CloudFormationTemplate, TemplateBuilder};
use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn web_tier_resources() -> Vec<ResourceDecl> {
    let subnet = |id: &str, cidr: &str| {
        ResourceDecl::new(id, "AWS::EC2::Subnet")
            .with_property("VpcId", Expression::resource_ref("MyVpc"))
            .with_property("CidrBlock", cidr)
    };
    let instance = |id: &str, subnet: &str| {
        ResourceDecl::new(id, "AWS::EC2::Instance")
            .with_property("ImageId", "ami-dd48a1ac")
            .with_property("SubnetId", Expression::get_att(subnet, "SubnetId"))
    };

    vec![
        ResourceDecl::new("AutoScalingGroup", "AWS::AutoScaling::AutoScalingGroup")
            .with_property("LoadBalancerNames", Expression::list(vec![Expression::resource_ref("WebElb")]))
            .with_property(
                "VPCZoneIdentifier",
                Expression::list(vec![
                    Expression::resource_ref("SubnetA"),
                    Expression::resource_ref("SubnetB"),
                ]),
            )
            .with_property("MinSize", "1")
            .with_property("MaxSize", "3"),
        ResourceDecl::new("WebElb", "AWS::ElasticLoadBalancing::LoadBalancer")
            .with_property(
                "Instances",
                Expression::list(vec![
                    Expression::resource_ref("InstanceA"),
                    Expression::resource_ref("InstanceB"),
                ]),
            )
            .with_property(
                "Listeners",
                Expression::list(vec![Expression::map([
                    ("LoadBalancerPort", Expression::string("443")),
                    ("InstancePort", Expression::string("443")),
                    ("Protocol", Expression::string("HTTPS")),
                ])]),
            ),
        ResourceDecl::new("MyVpc", "AWS::EC2::VPC").with_property("CidrBlock", "10.0.0.0/16"),
        subnet("SubnetA", "10.0.1.0/24"),
        subnet("SubnetB", "10.0.2.0/24"),
        instance("InstanceA", "SubnetA"),
        instance("InstanceB", "SubnetB"),
    ]
}

#[test]
fn test_web_tier_compiles_in_dependency_order() {
    let mut builder = TemplateBuilder::new(network_schemas());
    for resource in web_tier_resources() {
        builder.declare_resource(resource).unwrap();
    }

    let compiled = builder.compile().unwrap();
    assert_eq!(
        compiled.resource_order().to_vec(),
        vec![
            "MyVpc",
            "SubnetA",
            "SubnetB",
            "InstanceA",
            "InstanceB",
            "WebElb",
            "AutoScalingGroup"
        ]
    );
}

#[test]
fn test_full_network_topology_compiles_cleanly() {
    let builder = network_topology_builder();
    let compiled = match builder.compile() {
        Ok(compiled) => compiled,
        Err(report) => panic!("unexpected diagnostics:\n{}", report),
    };

    let document = compiled.document();
    assert_eq!(document.aws_template_format_version.as_deref(), Some("2010-09-09"));
    assert_eq!(document.parameters.len(), 8);
    assert_eq!(document.mappings.len(), 1);
    assert_eq!(document.resources.len(), 26);
    assert_eq!(document.outputs.len(), 11);

    // Declaration order is already a valid deployment order, so it is kept
    let declared: Vec<String> = network_resources()
        .into_iter()
        .map(|r| r.logical_id)
        .collect();
    assert_eq!(compiled.resource_order().to_vec(), declared);

    let subnet = &document.resources["PrivSubnetB"];
    assert_eq!(subnet.resource_type, "AWS::EC2::Subnet");
    assert_eq!(
        subnet.properties["CidrBlock"],
        json!({"Fn::Select": [1, {"Ref": "PrivCidrRanges"}]})
    );
    assert_eq!(
        subnet.properties["AvailabilityZone"],
        json!({"Fn::Join": ["", [{"Ref": "AWS::Region"}, "b"]]})
    );

    let instance = &document.resources["Ec2InstancePrivateSubnetA"];
    assert_eq!(
        instance.properties["ImageId"],
        json!({"Fn::FindInMap": ["AzMap", {"Ref": "AWS::Region"}, "AMI"]})
    );
    assert_eq!(
        instance.properties["SubnetId"],
        json!({"Fn::GetAtt": ["PrivSubnetA", "SubnetId"]})
    );

    assert_eq!(
        document.outputs["PrivSubnetsList"].value,
        json!({"Fn::Join": [",", [{"Ref": "PrivSubnetA"}, {"Ref": "PrivSubnetB"}]]})
    );
    assert_eq!(
        document.resources["ElasticLoadBalancer"].properties["AvailabilityZones"],
        json!({"Fn::GetAZs": ""})
    );
    assert_eq!(
        document.resources["AutoScalingGroup"].update_policy,
        Some(json!({
            "AutoScalingRollingUpdate": {
                "PauseTime": "PT10M",
                "MaxBatchSize": "1",
                "MinInstancesInService": "1"
            }
        }))
    );
}

#[test]
fn test_update_policy_survives_a_round_trip() {
    let compiled = network_topology_builder().compile().unwrap();
    let json = compiled.to_json().unwrap();
    assert!(json.contains("\"UpdatePolicy\""));

    let document = CloudFormationTemplate::from_json(&json).unwrap();
    let rebuilt = TemplateBuilder::from_document(&document, network_schemas()).unwrap();
    let policy = rebuilt
        .resources()
        .resource("AutoScalingGroup")
        .and_then(|r| r.update_policy.clone());
    assert_eq!(
        policy,
        network_resources()
            .into_iter()
            .find(|r| r.logical_id == "AutoScalingGroup")
            .and_then(|r| r.update_policy)
    );
    assert_eq!(rebuilt.compile().unwrap().to_json().unwrap(), json);
}

#[test]
fn test_update_policy_references_are_checked() {
    let mut resources = network_resources();
    if let Some(group) = resources.iter_mut().find(|r| r.logical_id == "AutoScalingGroup") {
        group.update_policy = Some(Expression::map([(
            "AutoScalingRollingUpdate",
            Expression::map([("MaxBatchSize", Expression::param_ref("BatchSize"))]),
        )]));
    }

    let report = builder_with(resources).compile().unwrap_err();
    assert_eq!(report.len(), 1);
    assert_eq!(
        report.diagnostics()[0].location.to_string(),
        "Resources.AutoScalingGroup.UpdatePolicy.AutoScalingRollingUpdate.MaxBatchSize"
    );
}

#[test]
fn test_declaration_order_does_not_break_dependencies() {
    let mut reversed = network_resources();
    reversed.reverse();
    let builder = builder_with(reversed);

    let compiled = builder.compile().unwrap();
    let order = compiled.resource_order();
    let position = |id: &str| order.iter().position(|r| r == id).unwrap();

    let graph = DependencyGraph::build(builder.resources());
    assert_eq!(graph.node_count(), 26);
    for id in order {
        for dependency in graph.dependencies_of(id) {
            assert!(
                position(dependency) < position(id),
                "{} must come after {}",
                id,
                dependency
            );
        }
    }

    // MyPublicRecord is declared first but waits on the load balancer
    assert_eq!(order[0], "CustomResource");
}

#[test]
fn test_dangling_references_are_reported() {
    let report = builder_with(network_resources_with_dangling_refs())
        .compile()
        .unwrap_err();

    let summary: Vec<(DiagnosticKind, String)> = report
        .diagnostics()
        .iter()
        .map(|d| (d.kind.clone(), d.location.to_string()))
        .collect();

    let parameter = DiagnosticKind::UnresolvedReference(ReferentKind::Parameter);
    let resource = DiagnosticKind::UnresolvedReference(ReferentKind::Resource);
    assert_eq!(
        summary,
        vec![
            (
                parameter.clone(),
                "Resources.Ec2InstancePrivateSubnetA.Properties.InstanceType".to_string()
            ),
            (
                resource.clone(),
                "Resources.Ec2InstancePrivateSubnetA.Properties.SecurityGroups[0]".to_string()
            ),
            (
                parameter,
                "Resources.Ec2InstancePrivateSubnetB.Properties.InstanceType".to_string()
            ),
            (
                resource.clone(),
                "Resources.Ec2InstancePrivateSubnetB.Properties.SecurityGroups[0]".to_string()
            ),
            (
                resource.clone(),
                "Resources.MyPrivateEniA.Properties.GroupSet[0]".to_string()
            ),
            (
                resource,
                "Resources.MyPrivateEniB.Properties.GroupSet[0]".to_string()
            ),
        ]
    );
    assert!(report.to_string().contains("Parameter 'InstanceType' is not declared"));
}

#[test]
fn test_yaml_rendering_of_topology() {
    let compiled = network_topology_builder().compile().unwrap();
    let yaml = compiled.to_yaml().unwrap();

    assert!(yaml.starts_with("AWSTemplateFormatVersion:"));
    assert!(yaml.contains("Fn::GetAtt:"));
    assert!(yaml.contains("AzMap:"));
}
