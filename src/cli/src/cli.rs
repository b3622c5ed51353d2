use std::path::Path;

use alloy_primitives::U256;
use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{Value, json};
use snapp_counter::{
    CounterAction, ReasonVariant, SessionConfig, SessionContext, TransactionBundle,
    abi::Abi,
    amount::{DEFAULT_DISPLAY_DECIMALS, format_strk, parse_strk},
    calldata::decode_event,
    change::COUNTER_CHANGED,
    config::load_session,
    counter::plan_offline,
    embedded_abis::{COUNTER_CONTRACT, COUNTER_CONTRACT_ABI},
    network::{parse_felt, short_address},
    reason::{ReasonShape, decode_reason},
};
use starknet_core::types::Felt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn from_matches(matches: &ArgMatches) -> Self {
        match matches.get_one::<String>("output").map(String::as_str) {
            Some("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

fn command() -> Command {
    Command::new("snapp-counter-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Plans counter transactions and decodes counter events offline")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Session config (TOML); defaults to devnet with the STRK token")
                .global(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FORMAT")
                .help("Output format")
                .value_parser(["text", "json"])
                .default_value("text")
                .global(true),
        )
        .subcommand(
            Command::new("plan")
                .about("Prints the bundle a counter action would submit")
                .arg(
                    Arg::new("action")
                        .value_name("ACTION")
                        .value_parser(["increase", "decrease", "reset", "set"])
                        .required(true),
                )
                .arg(
                    Arg::new("value")
                        .value_name("VALUE")
                        .help("New counter value for `set`")
                        .required_if_eq("action", "set"),
                )
                .arg(
                    Arg::new("counter-address")
                        .long("counter-address")
                        .value_name("ADDRESS")
                        .help("Counter contract address, overriding the config"),
                ),
        )
        .subcommand(
            Command::new("decode-reason")
                .about("Decodes a CounterChanged reason payload given as JSON")
                .arg(Arg::new("payload").value_name("JSON").required(true)),
        )
        .subcommand(
            Command::new("format-strk")
                .about("Formats an amount in FRI as STRK")
                .arg(Arg::new("fri").value_name("FRI").required(true))
                .arg(
                    Arg::new("decimals")
                        .short('d')
                        .long("decimals")
                        .value_name("N")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("4"),
                ),
        )
        .subcommand(
            Command::new("parse-strk")
                .about("Converts a STRK amount into FRI")
                .arg(Arg::new("strk").value_name("STRK").required(true)),
        )
        .subcommand(
            Command::new("decode-event")
                .about("Decodes a raw CounterChanged event")
                .arg(
                    Arg::new("keys")
                        .long("keys")
                        .value_name("FELT")
                        .value_delimiter(',')
                        .action(ArgAction::Append)
                        .required(true),
                )
                .arg(
                    Arg::new("data")
                        .long("data")
                        .value_name("FELT")
                        .value_delimiter(',')
                        .action(ArgAction::Append),
                ),
        )
}

/// app cli
pub struct Cli;

impl Cli {
    /// Parses process arguments and returns what to print on stdout
    pub fn execute() -> Result<String> {
        run(command().get_matches())
    }
}

fn run(matches: ArgMatches) -> Result<String> {
    let format = OutputFormat::from_matches(&matches);
    let config = matches.get_one::<String>("config").map(String::as_str);

    match matches.subcommand() {
        Some(("plan", sub)) => {
            let action = parse_action(sub)?;
            let counter_address = sub.get_one::<String>("counter-address").map(String::as_str);
            let context = session(config, counter_address)?;
            let bundle = plan_offline(&context, action)
                .map_err(|e| anyhow!(e.user_message(action.description())))
                .with_context(|| format!("Failed to plan `{action}`"))?;
            Ok(render_bundle(&bundle, format))
        }
        Some(("decode-reason", sub)) => {
            let payload = required(sub, "payload")?;
            let value: Value = serde_json::from_str(payload).context("Reason payload is not valid JSON")?;
            Ok(render_reason(&value, format))
        }
        Some(("format-strk", sub)) => {
            let fri = required(sub, "fri")?;
            let decimals = sub
                .get_one::<usize>("decimals")
                .copied()
                .unwrap_or(DEFAULT_DISPLAY_DECIMALS);
            let amount: U256 = fri
                .trim()
                .parse()
                .map_err(|e| anyhow!("Invalid FRI amount `{fri}`: {e}"))?;
            let strk = format_strk(amount, decimals);
            Ok(match format {
                OutputFormat::Text => strk,
                OutputFormat::Json => json!({"fri": amount.to_string(), "strk": strk}).to_string(),
            })
        }
        Some(("parse-strk", sub)) => {
            let strk = required(sub, "strk")?;
            let fri = parse_strk(strk)?;
            Ok(match format {
                OutputFormat::Text => fri.to_string(),
                OutputFormat::Json => json!({"strk": strk.trim(), "fri": fri.to_string()}).to_string(),
            })
        }
        Some(("decode-event", sub)) => {
            let keys = felts(sub, "keys")?;
            let data = felts(sub, "data")?;
            let abi = Abi::from_json(COUNTER_CONTRACT_ABI)?;
            let decoded = decode_event(&abi, COUNTER_CHANGED, &keys, &data)?;
            Ok(render_event(&decoded, format))
        }
        Some((other, _)) => Err(anyhow!("Unknown command `{other}`")),
        None => Err(anyhow!("No command given")),
    }
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing argument `{name}`"))
}

fn felts(matches: &ArgMatches, name: &str) -> Result<Vec<Felt>> {
    matches
        .get_many::<String>(name)
        .into_iter()
        .flatten()
        .map(|raw| parse_felt(raw).map_err(|e| anyhow!(e)))
        .collect()
}

fn parse_action(matches: &ArgMatches) -> Result<CounterAction> {
    let action = match required(matches, "action")? {
        "increase" => CounterAction::Increase,
        "decrease" => CounterAction::Decrease,
        "reset" => CounterAction::Reset,
        "set" => {
            let value = required(matches, "value")?;
            let value = CounterAction::parse_set_value(value)
                .map_err(|e| anyhow!(e.user_message("set counter")))?;
            CounterAction::Set(value)
        }
        other => return Err(anyhow!("Unknown action `{other}`")),
    };
    Ok(action)
}

fn session(config: Option<&str>, counter_address: Option<&str>) -> Result<SessionContext> {
    match (config, counter_address) {
        (Some(path), None) => {
            debug!(config = path, "loading session config");
            load_session(path)
        }
        (Some(path), Some(address)) => SessionConfig::from_file(path)?
            .with_contract(COUNTER_CONTRACT, address)
            .build_context(Path::new(path).parent().unwrap_or_else(|| Path::new("."))),
        (None, Some(address)) => SessionConfig::devnet()
            .with_contract(COUNTER_CONTRACT, address)
            .build_context(Path::new(".")),
        (None, None) => SessionConfig::devnet().build_context(Path::new(".")),
    }
}

fn render_bundle(bundle: &TransactionBundle, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let calls: Vec<Value> = bundle
                .calls()
                .iter()
                .map(|call| {
                    json!({
                        "contract": call.contract,
                        "address": call.target.to_fixed_hex_string(),
                        "entrypoint": call.entrypoint,
                        "selector": call.selector.to_hex_string(),
                        "calldata": call.calldata.iter().map(Felt::to_hex_string).collect::<Vec<_>>(),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&calls).unwrap_or_default()
        }
        OutputFormat::Text => bundle
            .calls()
            .iter()
            .enumerate()
            .map(|(i, call)| {
                let args: Vec<String> = call.args.iter().map(ToString::to_string).collect();
                format!(
                    "{}. {} ({}) {}({})\n   selector: {}\n   calldata: [{}]",
                    i + 1,
                    call.contract,
                    short_address(&call.target),
                    call.entrypoint,
                    args.join(", "),
                    call.selector.to_hex_string(),
                    call.calldata
                        .iter()
                        .map(Felt::to_hex_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn shape_name(shape: &ReasonShape<'_>) -> &'static str {
    match shape {
        ReasonShape::Plain(_) => "plain",
        ReasonShape::NestedVariant(_) => "nested_variant",
        ReasonShape::DirectKey(_) => "direct_key",
        ReasonShape::Discriminant(_) => "discriminant",
        ReasonShape::Unrecognized => "unrecognized",
    }
}

fn render_reason(payload: &Value, format: OutputFormat) -> String {
    let shape = ReasonShape::classify(payload);
    let variant = shape.variant();
    match format {
        OutputFormat::Text => format!("{variant} ({})", variant.label()),
        OutputFormat::Json => json!({
            "variant": variant,
            "label": variant.label(),
            "shape": shape_name(&shape),
        })
        .to_string(),
    }
}

fn render_event(decoded: &Value, format: OutputFormat) -> String {
    let reason = decoded
        .get("reason")
        .map_or(ReasonVariant::Unknown, decode_reason);
    match format {
        OutputFormat::Json => {
            let mut object = decoded.clone();
            if let Value::Object(map) = &mut object {
                map.insert("reason_variant".to_string(), json!(reason));
            }
            serde_json::to_string_pretty(&object).unwrap_or_default()
        }
        OutputFormat::Text => {
            let field = |name: &str| {
                decoded
                    .get(name)
                    .map(|value| match value {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default()
            };
            format!(
                "caller: {}\nold_value: {}\nnew_value: {}\nreason: {} ({})",
                field("caller"),
                field("old_value"),
                field("new_value"),
                reason,
                reason.label()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use starknet_core::utils::get_selector_from_name;

    fn run_args(args: &[&str]) -> Result<String> {
        let mut argv = vec!["snapp-counter-cli"];
        argv.extend_from_slice(args);
        run(command().try_get_matches_from(argv)?)
    }

    #[test]
    fn test_command_is_valid() {
        command().debug_assert();
    }

    #[test]
    fn test_plan_reset_prints_approve_then_reset() {
        let output = run_args(&["plan", "reset", "--counter-address", "0xc0de"]).unwrap();
        let lines: Vec<&str> = output.lines().filter(|l| !l.starts_with(' ')).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("1. Strk (0x0471...938d) approve(0x"));
        assert!(lines[0].ends_with(", 1000000000000000000)"));
        assert!(lines[1].starts_with("2. CounterContract (0x0000...c0de) reset_counter()"));
    }

    #[test]
    fn test_plan_json() {
        let output = run_args(&["plan", "set", "12", "--counter-address", "0xc0de", "-o", "json"]).unwrap();
        let calls: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(calls[0]["entrypoint"], "set_counter");
        assert_eq!(calls[0]["calldata"], json!(["0xc"]));
        assert_eq!(
            calls[0]["selector"],
            json!(get_selector_from_name("set_counter").unwrap().to_hex_string())
        );
    }

    #[test]
    fn test_plan_with_example_config() {
        let config = concat!(env!("CARGO_MANIFEST_DIR"), "/session.example.toml");
        let output = run_args(&["--config", config, "plan", "increase"]).unwrap();
        assert!(output.starts_with("1. CounterContract (0x02d2...2d77) increase_counter()"));
        assert!(output.ends_with("calldata: []"));
    }

    #[test]
    fn test_plan_without_counter_fails() {
        let err = run_args(&["plan", "increase"]).unwrap_err();
        assert!(format!("{err:#}").contains("Contract not deployed"));
    }

    #[test]
    fn test_plan_set_rejects_negative() {
        assert!(run_args(&["plan", "set", "-5", "--counter-address", "0x1"]).is_err());
    }

    #[test]
    fn test_decode_reason() {
        assert_eq!(
            run_args(&["decode-reason", r#"{"variant": {"Reset": {}}}"#]).unwrap(),
            "Reset (Reset)"
        );
        assert_eq!(
            run_args(&["decode-reason", r#"{"foo": "bar"}"#]).unwrap(),
            "Unknown (Unknown)"
        );
        let output = run_args(&["decode-reason", r#"{"kind": "Set"}"#, "--output", "json"]).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value, json!({"variant": "Set", "label": "Set by Owner", "shape": "discriminant"}));
    }

    #[test]
    fn test_amount_commands() {
        assert_eq!(run_args(&["format-strk", "1500000000000000000"]).unwrap(), "1.5000");
        assert_eq!(
            run_args(&["format-strk", "1500000000000000000", "--decimals", "1"]).unwrap(),
            "1.5"
        );
        assert_eq!(run_args(&["parse-strk", "2.25"]).unwrap(), "2250000000000000000");
        assert!(run_args(&["parse-strk", "-1"]).is_err());
    }

    #[test]
    fn test_decode_event() {
        let selector = get_selector_from_name("CounterChanged").unwrap().to_hex_string();
        let output = run_args(&[
            "decode-event",
            "--keys",
            &format!("{selector},0xabc"),
            "--data",
            "7,6,1",
        ])
        .unwrap();
        assert!(output.contains("old_value: 7"));
        assert!(output.contains("new_value: 6"));
        assert!(output.ends_with("reason: Decrease (Decreased)"));
    }
}
