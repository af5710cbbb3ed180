use crate::cli::OutputFormat;
use serde_json::Value;
use swarm::protocol_envelope::ProtocolEnvelope;
use swarm::SwarmError;

pub fn emit_output(output: OutputFormat, envelope: &ProtocolEnvelope) {
    match output {
        OutputFormat::Text => {
            let data = envelope.d.as_deref().unwrap_or(&Value::Null);
            match data.get("message").and_then(Value::as_str) {
                Some(message) => println!("{message}"),
                None => println!("{data}"),
            }
            if let Some(next) = &envelope.next {
                println!("next: {next}");
            }
        }
        OutputFormat::Json => match serde_json::to_string(envelope) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("failed to encode output: {e}"),
        },
    }
}

pub fn emit_error(output: OutputFormat, command: &str, error: &SwarmError) {
    let envelope = ProtocolEnvelope::failure(command, error);
    match output {
        OutputFormat::Text => {
            eprintln!("error [{}]: {error}", error.code());
            if let Some(fix) = &envelope.fix {
                eprintln!("fix: {fix}");
            }
        }
        OutputFormat::Json => emit_output(output, &envelope),
    }
}
