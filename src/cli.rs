use clap::{Args, Parser, Subcommand};
use groupmeter::config::{AppConfig, BotToken, FileConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use time::Duration;

const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Serve { config: AppConfig, debug: bool },
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();

    let file = match cli.config.as_deref() {
        Some(path) => match FileConfig::load(path) {
            Ok(file) => file,
            Err(err) => {
                eprintln!("error: {err}");
                return RunOutcome::Exit(2);
            }
        },
        None => FileConfig::default(),
    };

    if let Some(Command::Sign(args)) = cli.command.as_ref() {
        let code = run_sign(&cli, &file, args);
        return RunOutcome::Exit(code);
    }

    match resolve_config(&cli, file) {
        Ok(config) => RunOutcome::Serve {
            config,
            debug: cli.debug,
        },
        Err(err) => {
            eprintln!("error: {err}");
            RunOutcome::Exit(2)
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "groupmeter",
    version,
    about = "Verifies mini app init data and tracks per-group usage"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "GROUPMETER_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "GROUPMETER_BIND")]
    bind: Option<String>,
    #[arg(long, env = "GROUPMETER_BOT_TOKEN", hide_env_values = true)]
    bot_token: Option<String>,
    #[arg(long, env = "GROUPMETER_SESSION_MAX_AGE")]
    session_max_age: Option<String>,
    #[arg(long, env = "GROUPMETER_SWEEP_INTERVAL")]
    sweep_interval: Option<String>,
    #[arg(long, env = "GROUPMETER_AUTH_MAX_AGE")]
    auth_max_age: Option<String>,
    #[arg(long, env = "GROUPMETER_MAX_GROUPS")]
    max_groups: Option<usize>,
    #[arg(long, env = "GROUPMETER_CORS")]
    cors: bool,
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print signed init data for local testing.
    Sign(SignArgs),
}

#[derive(Args, Debug)]
struct SignArgs {
    #[arg(long)]
    user_id: i64,
    #[arg(long, default_value = "Test")]
    first_name: String,
    #[arg(long)]
    chat_instance: Option<String>,
    #[arg(long)]
    chat_type: Option<String>,
    #[arg(long)]
    start_param: Option<String>,
    #[arg(long)]
    auth_date: Option<i64>,
}

fn run_sign(cli: &Cli, file: &FileConfig, args: &SignArgs) -> i32 {
    let token = match resolve_bot_token(cli, file) {
        Ok(token) => token,
        Err(err) => {
            eprintln!("error: {err}");
            return 2;
        }
    };
    let user = serde_json::json!({ "id": args.user_id, "first_name": args.first_name });
    let auth_date = args
        .auth_date
        .unwrap_or_else(|| time::OffsetDateTime::now_utc().unix_timestamp())
        .to_string();
    let user = user.to_string();

    let mut fields: Vec<(&str, &str)> =
        vec![("auth_date", auth_date.as_str()), ("user", user.as_str())];
    if let Some(chat_instance) = args.chat_instance.as_deref() {
        fields.push(("chat_instance", chat_instance));
    }
    if let Some(chat_type) = args.chat_type.as_deref() {
        fields.push(("chat_type", chat_type));
    }
    if let Some(start_param) = args.start_param.as_deref() {
        fields.push(("start_param", start_param));
    }

    let verifier = groupmeter::auth::InitDataVerifier::new(token.expose());
    println!("{}", verifier.sign(&fields));
    0
}

fn resolve_bot_token(cli: &Cli, file: &FileConfig) -> Result<BotToken, String> {
    let token = cli
        .bot_token
        .as_deref()
        .or(file.bot_token.as_deref())
        .ok_or("a bot token is required (--bot-token or GROUPMETER_BOT_TOKEN)")?
        .trim();
    if token.is_empty() {
        return Err("bot token cannot be empty".to_string());
    }
    Ok(BotToken::new(token))
}

fn resolve_config(cli: &Cli, file: FileConfig) -> Result<AppConfig, String> {
    let bot_token = resolve_bot_token(cli, &file)?;

    let bind_raw = cli
        .bind
        .as_deref()
        .or(file.bind.as_deref())
        .unwrap_or(DEFAULT_BIND);
    let bind: SocketAddr = bind_raw
        .trim()
        .parse()
        .map_err(|_| format!("invalid bind address '{bind_raw}'"))?;

    let session_max_age = match cli
        .session_max_age
        .as_deref()
        .or(file.session_max_age.as_deref())
    {
        Some(raw) => parse_duration("session max age", raw)?,
        None => groupmeter::reaper::DEFAULT_SESSION_MAX_AGE,
    };

    let sweep_interval = match cli
        .sweep_interval
        .as_deref()
        .or(file.sweep_interval.as_deref())
    {
        Some(raw) => std::time::Duration::try_from(parse_duration("sweep interval", raw)?)
            .map_err(|_| format!("invalid sweep interval '{raw}'"))?,
        None => groupmeter::reaper::DEFAULT_SWEEP_INTERVAL,
    };

    let auth_max_age = cli
        .auth_max_age
        .as_deref()
        .or(file.auth_max_age.as_deref())
        .map(|raw| parse_duration("auth max age", raw))
        .transpose()?;

    let max_groups = cli.max_groups.or(file.max_groups);
    if max_groups == Some(0) {
        return Err("max groups must be greater than 0".to_string());
    }

    Ok(AppConfig {
        bind,
        bot_token,
        session_max_age,
        sweep_interval,
        auth_max_age,
        max_groups,
        cors: cli.cors || file.cors.unwrap_or(false),
    })
}

fn parse_duration(name: &str, raw: &str) -> Result<Duration, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(format!("{name} cannot be empty"));
    }

    let (amount, unit) = match value.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => {
            (&value[..value.len() - 1], ch.to_ascii_lowercase())
        }
        _ => (value, 's'),
    };

    let amount: i64 = amount
        .parse()
        .map_err(|_| format!("invalid {name} '{value}'; expected <number>[s|m|h|d]"))?;

    if amount <= 0 {
        return Err(format!("{name} must be greater than 0"));
    }

    let unit_seconds: i64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => {
            return Err(format!(
                "invalid {name} '{value}'; expected <number>[s|m|h|d]"
            ));
        }
    };

    amount
        .checked_mul(unit_seconds)
        .map(Duration::seconds)
        .ok_or_else(|| format!("{name} is too large"))
}
