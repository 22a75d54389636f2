//! s10history - history reader for E3/DC S10 power stations
//!
//! Connects over RSCP, authenticates and prints a day, month or year report.

mod config;
mod period;
mod report;

use chrono::Local;
use clap::Parser;
use colored::Colorize;
use config::{CipherKind, Config, ConfigError};
use period::{Period, PeriodArgs};
use report::TextReport;
use rscp_client::{
    Aes256Cbc, BlockCipher, CollectedReport, DataRequest, Rijndael256Cbc, ReportSink, Session,
    StreamTransport, Transport,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "s10history")]
#[command(about = "Read history data from an E3/DC S10 power station")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, env = "RSCP_CONFIG")]
    config: Option<PathBuf>,

    /// Power station address
    #[arg(short = 'i', long = "ip")]
    host: Option<String>,

    /// RSCP service port (default 5033)
    #[arg(short = 's', long = "service")]
    port: Option<u16>,

    /// Portal user name
    #[arg(short, long)]
    user: Option<String>,

    /// Portal password
    #[arg(short, long)]
    password: Option<String>,

    /// Environment variable holding the portal password
    #[arg(short = 'P', long = "password-env", value_name = "VAR")]
    password_env: Option<String>,

    /// RSCP (AES) password
    #[arg(short, long)]
    aes: Option<String>,

    /// Environment variable holding the RSCP password
    #[arg(short = 'A', long = "aes-env", value_name = "VAR")]
    aes_env: Option<String>,

    /// Year (2012-2032); current year if not present
    #[arg(short, long)]
    year: Option<i32>,

    /// Month 1-12, or negative offset; current month if not present
    #[arg(short, long, allow_negative_numbers = true)]
    month: Option<i32>,

    /// Day of month, or negative offset; today if not present
    #[arg(short, long, allow_negative_numbers = true)]
    day: Option<i32>,

    /// Only report the sum of the period
    #[arg(short, long)]
    brief: bool,

    /// Also request battery data for this battery index
    #[arg(long)]
    battery: Option<u8>,

    /// Stream cipher: rijndael256 (device default) or aes256
    #[arg(long, value_name = "CIPHER")]
    cipher: Option<CipherKind>,

    /// Print the collected report as JSON
    #[arg(long)]
    json: bool,

    /// Log level: 0 = warnings, 1 = info, 2 = debug (RUST_LOG takes precedence)
    #[arg(short = 'D', long = "debug", default_value_t = 0)]
    debug: u8,
}

impl Cli {
    /// Applies command-line flags on top of the loaded configuration.
    fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(ref host) = self.host {
            config.device.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.device.port = port;
        }
        if let Some(ref user) = self.user {
            config.credentials.user = Some(user.clone());
        }
        if let Some(ref password) = self.password {
            config.credentials.password = Some(password.clone());
        }
        if let Some(ref var) = self.password_env {
            config.credentials.password = Some(from_env(var, "password")?);
        }
        if let Some(ref aes) = self.aes {
            config.credentials.aes_password = Some(aes.clone());
        }
        if let Some(ref var) = self.aes_env {
            config.credentials.aes_password = Some(from_env(var, "AES password")?);
        }
        if let Some(index) = self.battery {
            config.session.battery_index = Some(index);
        }
        if let Some(cipher) = self.cipher {
            config.session.cipher = cipher;
        }
        Ok(())
    }

    fn period_args(&self) -> PeriodArgs {
        PeriodArgs {
            year: self.year,
            month: self.month,
            day: self.day,
        }
    }
}

fn from_env(var: &str, what: &str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| {
        ConfigError::ValidationError(format!(
            "environment variable {} for {} is not set",
            var, what
        ))
    })
}

fn init_tracing(debug: u8) {
    let level = match debug {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(cli).await {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config)?;
    config.validate()?;

    let period = Period::resolve(&cli.period_args(), Local::now().date_naive())?;
    let range = period.range(&Local, cli.brief)?;
    tracing::info!("Reporting one {:?} starting {}", period.kind, period.start);

    let mut request = DataRequest::new().with_history(range);
    if let Some(index) = config.session.battery_index {
        request = request.with_battery(index);
    }

    let connection = config.connection_config()?;
    tracing::info!("S10 addr: {}", connection.addr());
    let transport = StreamTransport::connect(&connection).await?;
    let password = config.aes_password()?;
    let credentials = config.credentials()?;
    let options = config.session_options();
    tracing::debug!("Using {:?} stream cipher", config.session.cipher);

    match config.session.cipher {
        CipherKind::Rijndael256 => {
            let cipher = Rijndael256Cbc::from_password(password);
            let session = Session::new(transport, cipher, credentials, options);
            read_report(session, &request, cli.json).await
        }
        CipherKind::Aes256 => {
            let cipher = Aes256Cbc::from_password(password);
            let session = Session::new(transport, cipher, credentials, options);
            read_report(session, &request, cli.json).await
        }
    }
}

async fn read_report<T, C>(
    mut session: Session<T, C>,
    request: &DataRequest,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>>
where
    T: Transport,
    C: BlockCipher,
{
    if json {
        let mut report = CollectedReport::default();
        run_session(&mut session, request, &mut report).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let mut report = TextReport::new(std::io::stdout().lock(), Local);
        run_session(&mut session, request, &mut report).await?;
        let _stdout = report.finish()?;
    }
    Ok(())
}

async fn run_session<T, C, S>(
    session: &mut Session<T, C>,
    request: &DataRequest,
    sink: &mut S,
) -> Result<(), Box<dyn std::error::Error>>
where
    T: Transport,
    C: BlockCipher,
    S: ReportSink,
{
    let summary = session.run(request, sink).await?;
    session.close().await?;

    tracing::debug!(
        "Finished after {} cycles, {} frames",
        summary.cycles,
        summary.frames
    );
    if !summary.authenticated {
        return Err(format!(
            "authentication failed (access level {})",
            summary.access_level.unwrap_or(0)
        )
        .into());
    }
    Ok(())
}
