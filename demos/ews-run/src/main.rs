#![allow(missing_docs)]
use std::env;
use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{info, warn};

use ews_client::{EwsClient, SecureString};

const USAGE: &str =
    "usage: ews-run [--ignore-ssl] [--host HOST] [--user USER] OPERATION [ARGS_JSON | @FILE]";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .pretty()
        .with_writer(io::stderr)
        .init();

    let RunArgs {
        host,
        username,
        password,
        ignore_ssl,
        operation,
        args,
    } = RunArgs::parse().context("parsing arguments")?;

    let mut client = EwsClient::new().context("building HTTP clients")?;
    client.set_ignore_ssl(ignore_ssl);
    client
        .auth(username, password, host)
        .context("configuring session")?;

    let tree = client
        .run(&operation, args)
        .await
        .with_context(|| format!("running {operation}"))?;
    client.cleanup();

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &tree).context("writing response")?;
    writeln!(stdout)?;

    info!("Bye!");
    Ok(())
}

#[derive(Debug)]
struct RunArgs {
    host: String,
    username: String,
    password: SecureString,
    ignore_ssl: bool,
    operation: String,
    args: Value,
}

impl RunArgs {
    fn parse() -> Result<Self> {
        let mut pargs = pico_args::Arguments::from_env();

        let ignore_ssl = pargs.contains("--ignore-ssl");
        let host: Option<String> = pargs
            .opt_value_from_str(["-h", "--host"])
            .context("parsing host argument")?;
        let username: Option<String> = pargs
            .opt_value_from_str(["-u", "--user"])
            .context("parsing user argument")?;

        let operation: String = pargs.free_from_str().context(USAGE)?;
        let args: Option<String> = pargs
            .opt_free_from_str()
            .context("parsing operation arguments")?;

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            warn!(?remaining, "Warning: unused arguments left");
        }

        Ok(Self {
            host: host
                .or_else(|| env::var("EWS_HOST").ok())
                .unwrap_or_default(),
            username: username
                .or_else(|| env::var("EWS_USERNAME").ok())
                .unwrap_or_default(),
            password: env::var("EWS_PASSWORD").unwrap_or_default().into(),
            ignore_ssl,
            operation,
            args: args
                .as_deref()
                .map(read_args)
                .transpose()?
                .unwrap_or(Value::Object(Map::new())),
        })
    }
}

fn read_args(raw: &str) -> Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("reading arguments from {path}"))?
        }
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("operation arguments must be JSON")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn should_redact_password_in_debug_output() {
        let args = RunArgs {
            host: "mail.example.com".to_string(),
            username: "CORP\\jdoe".to_string(),
            password: SecureString::from("hunter2"),
            ignore_ssl: false,
            operation: "GetFolder".to_string(),
            args: json!({}),
        };

        let debug = format!("{args:?}");

        assert!(!debug.contains("hunter2"), "{debug}");
        assert!(debug.contains("CORP\\\\jdoe"), "{debug}");
    }

    #[test]
    fn should_read_inline_arguments() -> Result<()> {
        let args = read_args(r#"{ "body": { "Foo": 1 } }"#)?;

        assert_eq!(args, json!({ "body": { "Foo": 1 } }));
        Ok(())
    }
}
