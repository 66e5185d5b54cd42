//! Config command implementation.

use super::Format;
use roomgate_gateway::GatewayConfig;

/// Runs the config command.
pub fn run(config: &GatewayConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", render(config, Format::parse(format)?)?);
    Ok(())
}

fn render(config: &GatewayConfig, format: Format) -> Result<String, Box<dyn std::error::Error>> {
    let config = config.redacted();
    if format == Format::Json {
        return Ok(serde_json::to_string_pretty(&config)? + "\n");
    }

    let request = config.request_config();
    let mut out = String::new();
    out.push_str("Gateway configuration\n");
    out.push_str("=====================\n");
    out.push_str(&format!("Production:          {}\n", config.production));
    out.push_str(&format!(
        "Broker:              {}\n",
        config.broker.amqp_url(config.production)
    ));
    out.push_str(&format!("Queue:               {}\n", config.broker.queue));
    out.push_str(&format!("Heartbeat:           {}s\n", config.heartbeat()));
    out.push_str(&format!("Request timeout:     {:?}\n", request.timeout));
    out.push_str(&format!("Max retries:         {}\n", request.max_retries));
    out.push_str(&format!("Backoff base:        {:?}\n", request.backoff_base));
    out.push_str(&format!(
        "Contribution window: {:?}\n",
        config.contribution_window()
    ));
    out.push_str(&format!(
        "Storage:             {:?}\n",
        config.collaboration.storage
    ));
    out.push_str(&format!(
        "Logging:             {}{}\n",
        config.logging.level,
        if config.logging.json { " (json)" } else { "" }
    ));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn password_never_printed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"broker": {{"host": "mq", "user": "gw", "password": "hunter2"}}}}"#
        )
        .unwrap();
        let config = GatewayConfig::from_file(file.path()).unwrap();

        for format in [Format::Text, Format::Json] {
            let out = render(&config, format).unwrap();
            assert!(!out.contains("hunter2"), "{out}");
            assert!(out.contains("***"), "{out}");
        }
    }

    #[test]
    fn json_output_reloads() {
        let config = GatewayConfig::default().with_max_retries(7);
        let out = render(&config, Format::Json).unwrap();
        let reloaded = GatewayConfig::from_json_str(&out, |_| None).unwrap();
        assert_eq!(reloaded, config.redacted());
        assert_eq!(reloaded.request.max_retries, 7);
    }
}
