//! Pipeline command implementation.

use super::Format;
use roomgate_gateway::{Gateway, GatewayConfig, Hook};
use roomgate_rpc::MockTransport;
use serde::Serialize;
use std::sync::Arc;

/// Extension of the composed pipeline.
#[derive(Debug, Serialize)]
pub struct ExtensionRow {
    /// Extension name.
    pub name: &'static str,
    /// Dispatch priority; higher runs first.
    pub priority: usize,
}

/// Dispatch order of a single hook.
#[derive(Debug, Serialize)]
pub struct HookRow {
    /// Hook name.
    pub hook: &'static str,
    /// Extensions receiving the hook, in order.
    pub extensions: Vec<&'static str>,
}

/// Pipeline description.
#[derive(Debug, Serialize)]
pub struct PipelineReport {
    /// Extensions in priority order.
    pub extensions: Vec<ExtensionRow>,
    /// Hooks with at least one extension.
    pub hooks: Vec<HookRow>,
}

/// Runs the pipeline command.
pub fn run(config: &GatewayConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let format = Format::parse(format)?;
    let report = describe(config)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => print!("{}", render_text(&report)),
    }
    Ok(())
}

/// Composes the pipeline without a broker link and describes it.
pub fn describe(config: &GatewayConfig) -> Result<PipelineReport, Box<dyn std::error::Error>> {
    let transport = Arc::new(MockTransport::new());
    transport.set_connected(false);
    let gateway = Gateway::new(config.clone(), transport)?;
    let pipeline = gateway.pipeline();

    let extensions = pipeline
        .priorities()
        .into_iter()
        .map(|(name, priority)| ExtensionRow { name, priority })
        .collect();
    let hooks = Hook::ALL
        .into_iter()
        .map(|hook| HookRow {
            hook: hook.as_str(),
            extensions: pipeline.dispatch_order(hook),
        })
        .filter(|row| !row.extensions.is_empty())
        .collect();
    Ok(PipelineReport { extensions, hooks })
}

fn render_text(report: &PipelineReport) -> String {
    let mut out = String::new();
    out.push_str("Extensions\n");
    out.push_str("==========\n");
    for row in &report.extensions {
        out.push_str(&format!("{:>3}  {}\n", row.priority, row.name));
    }
    out.push_str("\nHooks\n");
    out.push_str("=====\n");
    for row in &report.hooks {
        out.push_str(&format!("{:<20} {}\n", row.hook, row.extensions.join(" -> ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomgate_gateway::StorageKind;

    #[test]
    fn default_pipeline() {
        let report = describe(&GatewayConfig::default()).unwrap();
        let names: Vec<_> = report.extensions.iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            vec!["authenticator", "authorizer", "storage", "contributions"]
        );

        let connect = report.hooks.iter().find(|h| h.hook == "onConnect").unwrap();
        assert_eq!(connect.extensions, vec!["authenticator", "authorizer"]);
        assert!(render_text(&report).contains("authenticator -> authorizer"));
    }

    #[test]
    fn memory_storage_has_no_after_store_hook() {
        let config = GatewayConfig::default().with_storage(StorageKind::Memory);
        let report = describe(&config).unwrap();
        assert!(report.extensions.iter().any(|e| e.name == "memory-storage"));
        assert!(!report.hooks.iter().any(|h| h.hook == "afterStoreDocument"));
    }
}
