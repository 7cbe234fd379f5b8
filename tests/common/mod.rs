//! Shared fixtures: resource schemas and the VPC network topology.
#![allow(dead_code)]

use cfnsmith::app::cfn_intrinsic_functions::Expression;
use cfnsmith::app::cfn_parameters::{MappingTable, ParameterDef};
use cfnsmith::app::cfn_resources::{OutputDecl, ResourceDecl};
use cfnsmith::app::cfn_schema::SchemaRegistry;
use cfnsmith::TemplateBuilder;

pub const CIDR_PATTERN: &str = r"(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})/(\d{1,2})";

pub fn network_schemas() -> SchemaRegistry {
    SchemaRegistry::from_specification_json(include_str!(
        "../fixtures/network_resource_specification.json"
    ))
    .expect("fixture specification should load")
}

pub fn vpc_cidr_parameter() -> ParameterDef {
    ParameterDef::string("VpcCidrRange")
        .with_description("Cidr range for VPC")
        .with_min_length(9)
        .with_max_length(18)
        .with_allowed_pattern(CIDR_PATTERN)
        .with_constraint_description("must be a valid IP CIDR range of the form x.x.x.x/x.")
}

pub fn network_parameters() -> Vec<ParameterDef> {
    vec![
        vpc_cidr_parameter(),
        ParameterDef::comma_delimited_list("PrivCidrRanges")
            .with_description("list of private subnet ranges"),
        ParameterDef::comma_delimited_list("PubCidrRanges")
            .with_description("list of public subnet ranges"),
        ParameterDef::string("AvailabilityZone"),
        ParameterDef::comma_delimited_list("SecurityGroup"),
        ParameterDef::comma_delimited_list("SSHKey").with_default("Shweta"),
        ParameterDef::string("Instance")
            .with_description("WebServer EC2 instance type")
            .with_default("m1.small")
            .with_allowed_values(["t1.micro", "m1.small", "m1.medium", "m1.large", "m1.xlarge"])
            .with_constraint_description("must be a valid EC2 instance type."),
        ParameterDef::string("WebServerPort")
            .with_default("443")
            .with_description("TCP/IP port of the web server"),
    ]
}

pub fn az_map() -> MappingTable {
    MappingTable::new()
        .with_entry("us-east-1a", [("AMI", "ami-dd48a1ac")])
        .with_entry("us-east-1b", [("AMI", "ami-eb4ca59a")])
        .with_entry("us-east-1c", [("AMI", "ami-dc48a1ad")])
}

fn region_zone(suffix: &str) -> Expression {
    Expression::join("", vec![Expression::param_ref("AWS::Region"), suffix.into()])
}

fn subnet(id: &str, index: i64, ranges: &str, zone: &str) -> ResourceDecl {
    ResourceDecl::new(id, "AWS::EC2::Subnet")
        .with_property("VpcId", Expression::resource_ref("MyVpc"))
        .with_property(
            "CidrBlock",
            Expression::select(Expression::integer(index), Expression::param_ref(ranges)),
        )
        .with_property("AvailabilityZone", region_zone(zone))
}

fn route_table(id: &str) -> ResourceDecl {
    ResourceDecl::new(id, "AWS::EC2::RouteTable").with_property("VpcId", Expression::resource_ref("MyVpc"))
}

fn route_table_association(id: &str, route_table: &str, subnet: &str) -> ResourceDecl {
    ResourceDecl::new(id, "AWS::EC2::SubnetRouteTableAssociation")
        .with_property("RouteTableId", Expression::resource_ref(route_table))
        .with_property("SubnetId", Expression::resource_ref(subnet))
}

fn instance(id: &str, subnet: &str, security_group: &str, instance_type: &str) -> ResourceDecl {
    ResourceDecl::new(id, "AWS::EC2::Instance")
        .with_property(
            "SecurityGroups",
            Expression::list(vec![Expression::resource_ref(security_group)]),
        )
        .with_property("KeyName", Expression::param_ref("SSHKey"))
        .with_property("InstanceType", Expression::param_ref(instance_type))
        .with_property("SubnetId", Expression::get_att(subnet, "SubnetId"))
        .with_property(
            "ImageId",
            Expression::find_in_map("AzMap", Expression::param_ref("AWS::Region"), "AMI".into()),
        )
}

fn network_interface(id: &str, subnet: &str, security_group: &str) -> ResourceDecl {
    ResourceDecl::new(id, "AWS::EC2::NetworkInterface")
        .with_property("SourceDestCheck", false)
        .with_property("SubnetId", Expression::get_att(subnet, "SubnetId"))
        .with_property(
            "GroupSet",
            Expression::list(vec![Expression::resource_ref(security_group)]),
        )
}

fn network_interface_attachment(id: &str, instance: &str, eni: &str) -> ResourceDecl {
    ResourceDecl::new(id, "AWS::EC2::NetworkInterfaceAttachment")
        .with_property("DeviceIndex", "1")
        .with_property("InstanceId", Expression::resource_ref(instance))
        .with_property("NetworkInterfaceId", Expression::resource_ref(eni))
}

fn security_group_rule(cidr: Expression) -> Expression {
    Expression::map([
        ("IpProtocol", Expression::string("tcp")),
        ("FromPort", Expression::string("443")),
        ("ToPort", Expression::string("443")),
        ("CidrIp", cidr),
    ])
}

fn load_balancer() -> ResourceDecl {
    ResourceDecl::new("ElasticLoadBalancer", "AWS::ElasticLoadBalancing::LoadBalancer")
        .with_property(
            "AccessLoggingPolicy",
            Expression::map([
                ("EmitInterval", Expression::integer(5)),
                ("Enabled", Expression::boolean(true)),
                ("S3BucketName", Expression::string("logging")),
                ("S3BucketPrefix", Expression::string("myELB")),
            ]),
        )
        .with_property("AvailabilityZones", Expression::get_azs("".into()))
        .with_property(
            "ConnectionDrainingPolicy",
            Expression::map([
                ("Enabled", Expression::boolean(true)),
                ("Timeout", Expression::integer(300)),
            ]),
        )
        .with_property("CrossZone", true)
        .with_property(
            "Instances",
            Expression::list(vec![
                Expression::resource_ref("Ec2InstancePrivateSubnetA"),
                Expression::resource_ref("Ec2InstancePrivateSubnetB"),
            ]),
        )
        .with_property(
            "Listeners",
            Expression::list(vec![Expression::map([
                ("LoadBalancerPort", Expression::string("443")),
                ("InstancePort", Expression::param_ref("WebServerPort")),
                ("Protocol", Expression::string("HTTPS")),
            ])]),
        )
        .with_property(
            "Subnets",
            Expression::list(vec![
                Expression::resource_ref("PubSubnetA"),
                Expression::resource_ref("PubSubnetB"),
            ]),
        )
        .with_property(
            "HealthCheck",
            Expression::map([
                (
                    "Target",
                    Expression::join(
                        "",
                        vec![
                            "HTTPS:".into(),
                            Expression::param_ref("WebServerPort"),
                            "/".into(),
                        ],
                    ),
                ),
                ("HealthyThreshold", Expression::string("3")),
                ("UnhealthyThreshold", Expression::string("5")),
                ("Interval", Expression::string("30")),
                ("Timeout", Expression::string("5")),
            ]),
        )
}

fn auto_scaling_group() -> ResourceDecl {
    ResourceDecl::new("AutoScalingGroup", "AWS::AutoScaling::AutoScalingGroup")
        .with_property("LaunchConfigurationName", "LaunchConfiguration")
        .with_property("LoadBalancerNames", Expression::resource_ref("ElasticLoadBalancer"))
        .with_property(
            "VPCZoneIdentifier",
            Expression::list(vec![
                Expression::resource_ref("PubSubnetA"),
                Expression::resource_ref("PubSubnetB"),
            ]),
        )
        .with_property("MinSize", "1")
        .with_property("MaxSize", "3")
        .with_update_policy(Expression::map([(
            "AutoScalingRollingUpdate",
            Expression::map([
                ("PauseTime", Expression::string("PT10M")),
                ("MaxBatchSize", Expression::string("1")),
                ("MinInstancesInService", Expression::string("1")),
            ]),
        )]))
}

/// Resources of the network topology in declaration order, with the security group
/// declared and instance types pointing at the `Instance` parameter.
pub fn network_resources() -> Vec<ResourceDecl> {
    network_resources_with("MySecurityGroup", "Instance", true)
}

/// The same topology with two wiring mistakes: the security group is
/// referenced but never added, and instances reference `InstanceType`.
pub fn network_resources_with_dangling_refs() -> Vec<ResourceDecl> {
    network_resources_with("MySecurityGroup", "InstanceType", false)
}

fn network_resources_with(
    security_group: &str,
    instance_type: &str,
    declare_security_group: bool,
) -> Vec<ResourceDecl> {
    let mut resources = vec![
        ResourceDecl::new("MyVpc", "AWS::EC2::VPC")
            .with_property("CidrBlock", Expression::param_ref("VpcCidrRange"))
            .with_property("EnableDnsSupport", true)
            .with_property("EnableDnsHostnames", true)
            .with_property("InstanceTenancy", "default"),
        subnet("PrivSubnetA", 0, "PrivCidrRanges", "a"),
        subnet("PrivSubnetB", 1, "PrivCidrRanges", "b"),
        subnet("PubSubnetA", 0, "PubCidrRanges", "a"),
        subnet("PubSubnetB", 1, "PubCidrRanges", "b"),
        route_table("PublicRouteTable"),
        route_table_association("PublicRTAssociationA", "PublicRouteTable", "PubSubnetA"),
        route_table_association("PublicRTAssociationB", "PublicRouteTable", "PubSubnetB"),
        route_table("PrivateRouteTableA"),
        route_table("PrivateRouteTableB"),
        route_table_association("PrivateRTAssociationA", "PrivateRouteTableA", "PrivSubnetA"),
        route_table_association("PrivateRTAssociationB", "PrivateRouteTableB", "PrivSubnetB"),
        ResourceDecl::new("myigw", "AWS::EC2::InternetGateway"),
        ResourceDecl::new("myIGWAttachVPC", "AWS::EC2::VPCGatewayAttachment")
            .with_property("VpcId", Expression::resource_ref("MyVpc"))
            .with_property("InternetGatewayId", Expression::resource_ref("myigw")),
        ResourceDecl::new("MyVpcFlowLogs", "AWS::EC2::FlowLog")
            .with_property(
                "DeliverLogsPermissionArn",
                Expression::join(
                    "",
                    vec![
                        "arn:aws:iam::".into(),
                        Expression::param_ref("AWS::AccountId"),
                        ":role/AWS_FLOW_LOGS".into(),
                    ],
                ),
            )
            .with_property(
                "LogGroupName",
                Expression::join("", vec!["VpcFlowLogsLogGroup".into(), "-".into(), "MyVPC".into()]),
            )
            .with_property("ResourceId", Expression::resource_ref("MyVpc"))
            .with_property("ResourceType", "VPC")
            .with_property("TrafficType", "ALL"),
    ];

    if declare_security_group {
        resources.push(
            ResourceDecl::new(security_group, "AWS::EC2::SecurityGroup")
                .with_property("GroupDescription", "Security Group")
                .with_property(
                    "SecurityGroupIngress",
                    Expression::list(vec![security_group_rule(Expression::param_ref("SecurityGroup"))]),
                )
                .with_property(
                    "SecurityGroupEgress",
                    Expression::list(vec![security_group_rule("10.0.0.0/20".into())]),
                )
                .with_property("VpcId", Expression::resource_ref("MyVpc")),
        );
    }

    resources.extend([
        instance("Ec2InstancePrivateSubnetA", "PrivSubnetA", security_group, instance_type),
        instance("Ec2InstancePrivateSubnetB", "PrivSubnetB", security_group, instance_type),
        network_interface("MyPrivateEniA", "PrivSubnetA", security_group),
        network_interface_attachment("MyPrivateEniAttachmentA", "Ec2InstancePrivateSubnetA", "MyPrivateEniA"),
        network_interface("MyPrivateEniB", "PrivSubnetB", security_group),
        network_interface_attachment("MyPrivateEniAttachmentB", "Ec2InstancePrivateSubnetB", "MyPrivateEniB"),
        load_balancer(),
        auto_scaling_group(),
        ResourceDecl::new("CustomResource", "Custom::CustomRoute53ZoneInfo")
            .with_property("ServiceToken", "MyToken")
            .with_property("DomainName", "MyDomain")
            .with_property("PrivateZone", false),
        ResourceDecl::new("MyPublicRecord", "AWS::Route53::RecordSet")
            .with_property(
                "AliasTarget",
                Expression::map([
                    ("DNSName", Expression::resource_ref("ElasticLoadBalancer")),
                    ("HostedZoneId", Expression::resource_ref("ElasticLoadBalancer")),
                ]),
            )
            .with_property("HostedZoneId", Expression::resource_ref("CustomResource"))
            .with_property("Name", "MyPublicRecord-us-east-1-a")
            .with_property("Type", "A"),
    ]);

    resources
}

pub fn network_outputs() -> Vec<OutputDecl> {
    let list_of = |a: &str, b: &str| {
        Expression::join(",", vec![Expression::resource_ref(a), Expression::resource_ref(b)])
    };
    let pick = |index: i64, ranges: &str| {
        Expression::select(Expression::integer(index), Expression::param_ref(ranges))
    };

    vec![
        OutputDecl::new("MyVpcId", Expression::resource_ref("MyVpc")),
        OutputDecl::new("PublicSubnetAId", Expression::resource_ref("PubSubnetA")),
        OutputDecl::new("PublicSubnetBId", Expression::resource_ref("PubSubnetB")),
        OutputDecl::new("PubSubnetsList", list_of("PubSubnetA", "PubSubnetB")),
        OutputDecl::new("PrivateSubnetAId", Expression::resource_ref("PrivSubnetA")),
        OutputDecl::new("PrivateSubnetBId", Expression::resource_ref("PrivSubnetB")),
        OutputDecl::new("PrivSubnetsList", list_of("PrivSubnetA", "PrivSubnetB")),
        OutputDecl::new("PrivSubnetCidrA", pick(0, "PrivCidrRanges")),
        OutputDecl::new("PrivSubnetCidrB", pick(1, "PrivCidrRanges")),
        OutputDecl::new("PubSubnetCidrA", pick(0, "PubCidrRanges")),
        OutputDecl::new("PubSubnetCidrB", pick(1, "PubCidrRanges")),
    ]
}

pub fn builder_with(resources: Vec<ResourceDecl>) -> TemplateBuilder {
    let mut builder = TemplateBuilder::new(network_schemas());
    for parameter in network_parameters() {
        builder.declare_parameter(parameter).unwrap();
    }
    builder.declare_mapping("AzMap", az_map()).unwrap();
    for resource in resources {
        builder.declare_resource(resource).unwrap();
    }
    for output in network_outputs() {
        builder.declare_output(output).unwrap();
    }
    builder
}

/// The complete network topology, ready to compile.
pub fn network_topology_builder() -> TemplateBuilder {
    builder_with(network_resources())
}
