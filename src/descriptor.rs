//! JSON task definition files accepted by `register`.

use anyhow::{Context, Result, bail};
use aws_sdk_ecs::types::{ContainerDefinition, KeyValuePair, PortMapping, TransportProtocol};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    #[serde(alias = "Family")]
    pub family: String,
    #[serde(alias = "ContainerDefinitions", default)]
    pub container_definitions: Vec<ContainerDescriptor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDescriptor {
    #[serde(alias = "Name", default)]
    pub name: String,
    #[serde(alias = "Image", default)]
    pub image: String,
    #[serde(alias = "CPU", alias = "Cpu", default)]
    pub cpu: i32,
    #[serde(alias = "Memory")]
    pub memory: Option<i32>,
    #[serde(alias = "Essential")]
    pub essential: Option<bool>,
    #[serde(alias = "Command", default)]
    pub command: Vec<String>,
    #[serde(alias = "EntryPoint", default)]
    pub entry_point: Vec<String>,
    #[serde(alias = "Environment", default)]
    pub environment: Vec<EnvironmentVariable>,
    #[serde(alias = "PortMappings", default)]
    pub port_mappings: Vec<PortDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentVariable {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Value", default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDescriptor {
    #[serde(alias = "ContainerPort")]
    pub container_port: i32,
    #[serde(alias = "HostPort")]
    pub host_port: Option<i32>,
    #[serde(alias = "Protocol")]
    pub protocol: Option<String>,
}

impl TaskDescriptor {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading task file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("reading task file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let descriptor: Self = serde_json::from_str(raw)?;
        match descriptor.container_definitions.len() {
            1 => Ok(descriptor),
            0 => bail!("task file declares no container definition"),
            n => bail!(
                "task file declares {n} container definitions, only a single container definition is supported"
            ),
        }
    }

    pub fn into_parts(self) -> (String, ContainerDefinition) {
        let container = self
            .container_definitions
            .into_iter()
            .next()
            .unwrap_or_default();
        (self.family, container.into_definition())
    }
}

impl ContainerDescriptor {
    fn into_definition(self) -> ContainerDefinition {
        let environment = self
            .environment
            .into_iter()
            .map(|v| KeyValuePair::builder().name(v.name).value(v.value).build())
            .collect();
        let port_mappings = self
            .port_mappings
            .into_iter()
            .map(|p| {
                PortMapping::builder()
                    .container_port(p.container_port)
                    .set_host_port(p.host_port)
                    .set_protocol(p.protocol.as_deref().map(TransportProtocol::from))
                    .build()
            })
            .collect();

        ContainerDefinition::builder()
            .name(self.name)
            .image(self.image)
            .cpu(self.cpu)
            .set_memory(self.memory)
            .set_essential(self.essential)
            .set_command(Some(self.command))
            .set_entry_point(Some(self.entry_point))
            .set_environment(Some(environment))
            .set_port_mappings(Some(port_mappings))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SINGLE: &str = r#"{
        "family": "web",
        "containerDefinitions": [{
            "name": "web",
            "image": "repo/web:1.2",
            "cpu": 256,
            "memory": 512,
            "essential": true,
            "command": ["serve", "--port", "8080"],
            "entryPoint": ["/bin/sh", "-c"],
            "environment": [{ "name": "MODE", "value": "prod" }],
            "portMappings": [{ "containerPort": 8080, "hostPort": 80, "protocol": "tcp" }]
        }]
    }"#;

    #[test]
    fn parses_single_container() {
        let (family, def) = TaskDescriptor::parse(SINGLE).unwrap().into_parts();

        assert_eq!(family, "web");
        assert_eq!(def.name(), Some("web"));
        assert_eq!(def.image(), Some("repo/web:1.2"));
        assert_eq!(def.cpu(), 256);
        assert_eq!(def.memory(), Some(512));
        assert_eq!(def.essential(), Some(true));
        assert_eq!(def.command(), ["serve", "--port", "8080"]);
        assert_eq!(def.entry_point(), ["/bin/sh", "-c"]);
        assert_eq!(def.environment()[0].name(), Some("MODE"));
        assert_eq!(def.environment()[0].value(), Some("prod"));
        assert_eq!(def.port_mappings()[0].container_port(), Some(8080));
        assert_eq!(def.port_mappings()[0].host_port(), Some(80));
        assert_eq!(
            def.port_mappings()[0].protocol(),
            Some(&TransportProtocol::Tcp)
        );
    }

    #[test]
    fn accepts_pascal_case_keys() {
        let raw = r#"{
            "Family": "worker",
            "ContainerDefinitions": [{
                "Name": "worker",
                "Image": "repo/worker",
                "CPU": 128,
                "Memory": 256,
                "PortMappings": [{ "ContainerPort": 9000, "HostPort": 9000 }],
                "Environment": [{ "Name": "QUEUE", "Value": "jobs" }]
            }]
        }"#;
        let (family, def) = TaskDescriptor::parse(raw).unwrap().into_parts();

        assert_eq!(family, "worker");
        assert_eq!(def.cpu(), 128);
        assert_eq!(def.memory(), Some(256));
        assert_eq!(def.essential(), None);
        assert_eq!(def.port_mappings()[0].host_port(), Some(9000));
        assert_eq!(def.environment()[0].value(), Some("jobs"));
    }

    #[test]
    fn rejects_multiple_containers() {
        let raw = r#"{
            "family": "pair",
            "containerDefinitions": [
                { "name": "a", "image": "repo/a" },
                { "name": "b", "image": "repo/b" }
            ]
        }"#;
        let err = TaskDescriptor::parse(raw).unwrap_err();
        assert!(err.to_string().contains("2 container definitions"), "{err}");
    }

    #[test]
    fn rejects_missing_containers() {
        let err = TaskDescriptor::parse(r#"{ "family": "empty" }"#).unwrap_err();
        assert!(err.to_string().contains("no container definition"), "{err}");
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(TaskDescriptor::parse("{ \"family\": ").is_err());
        assert!(TaskDescriptor::parse(r#"{ "containerDefinitions": [] }"#).is_err());
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SINGLE.as_bytes()).unwrap();

        let descriptor = TaskDescriptor::load(file.path()).unwrap();
        assert_eq!(descriptor.family, "web");
        assert_eq!(descriptor.container_definitions.len(), 1);
    }

    #[test]
    fn load_reports_path_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");

        let err = TaskDescriptor::load(&missing).unwrap_err();
        assert!(err.to_string().contains("missing.json"), "{err}");
    }
}
