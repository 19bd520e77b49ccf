use std::path::PathBuf;
use std::process::exit;

use chrono::Utc;
use clap::error::ErrorKind as ClapErrorKind;
use clap::Parser;
use log::{error, info};
use tlsprobe::config::Config;
use tlsprobe::{
    check, render_failure, OutputFormat, ProbeError, Report, TlsProber, UNKNOWN_EXIT_CODE,
};

#[derive(Debug, Parser)]
#[command(name = "tlsprobe", author, version, about, long_about = None)]
struct Opts {
    /// Hostname to connect to
    #[arg(short, long)]
    server: Option<String>,

    /// Destination port [default: 443]
    #[arg(short, long, allow_negative_numbers = true)]
    port: Option<i64>,

    /// Critical threshold in days [default: 5]
    #[arg(short, long, allow_negative_numbers = true)]
    crit: Option<i64>,

    /// Warning threshold in days [default: 15]
    #[arg(short, long, allow_negative_numbers = true)]
    warn: Option<i64>,

    /// Name expected in the certificate, also accepted as -cn.
    /// Defaults to the server; an empty value skips the check
    #[arg(long)]
    canonical: Option<String>,

    /// Server name sent during the handshake [default: server]
    #[arg(long)]
    sni: Option<String>,

    /// Connect and handshake timeout in seconds [default: 10]
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Do not validate the certificate chain against the system trust store
    #[arg(long)]
    insecure: bool,

    /// PEM file with extra CA certificates trusted next to the system store
    #[arg(long, value_name = "FILE")]
    ca_file: Option<PathBuf>,

    /// Output format [default: text]
    #[arg(short, long, value_parser = ["text", "json"])]
    output: Option<String>,

    /// TOML configuration file; command-line values take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    generate_config: bool,
}

impl Opts {
    fn to_config(&self) -> Config {
        Config {
            server: self.server.clone(),
            port: self.port,
            crit: self.crit,
            warn: self.warn,
            canonical: self.canonical.clone(),
            sni: self.sni.clone(),
            timeout: self.timeout,
            insecure: self.insecure.then_some(true),
            ca_file: self.ca_file.clone(),
            output: self.output.clone(),
        }
    }
}

/// Options whose next argument is a value rather than a flag.
const VALUE_OPTIONS: &[&str] = &[
    "-s", "--server", "-p", "--port", "-c", "--crit", "-w", "--warn", "-cn", "--canonical",
    "--sni", "-t", "--timeout", "-o", "--output", "--config", "--ca-file",
];

/// Rewrites the two-letter `-cn` flag, which clap would read as `-c n`.
/// Values of other options and everything after `--` are left alone.
fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut normalized = Vec::new();
    let mut takes_value = false;
    let mut positional = false;
    for (index, arg) in args.into_iter().enumerate() {
        if index == 0 || positional || takes_value {
            takes_value = false;
            normalized.push(arg);
            continue;
        }
        if arg == "--" {
            positional = true;
            normalized.push(arg);
            continue;
        }
        takes_value = VALUE_OPTIONS.contains(&arg.as_str());
        if arg == "-cn" {
            normalized.push("--canonical".to_string());
        } else if let Some(value) = arg.strip_prefix("-cn=") {
            normalized.push(format!("--canonical={}", value));
        } else {
            normalized.push(arg);
        }
    }
    normalized
}

fn merged_config(opts: &Opts) -> Result<Config, ProbeError> {
    let file_config = match &opts.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    Ok(Config::defaults()
        .merge_with(file_config)
        .merge_with(opts.to_config()))
}

/// Runs one check. The output format is resolved first so that failures
/// are printed the way the caller asked for.
fn run(opts: &Opts) -> (OutputFormat, Result<Report, ProbeError>) {
    let merged = match merged_config(opts) {
        Ok(merged) => merged,
        Err(e) => return (opts.to_config().output_format(), Err(e)),
    };
    let format = merged.output_format();
    (format, check_merged(merged))
}

fn check_merged(merged: Config) -> Result<Report, ProbeError> {
    let settings = merged.validate()?;
    info!(
        "checking {} (sni {}, verify {})",
        settings.target.address(),
        settings.target.sni_name,
        settings.verify
    );

    let prober = TlsProber::from_config(&settings);
    check(&prober, &settings, Utc::now())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let opts = match Opts::try_parse_from(normalize_args(std::env::args())) {
        Ok(opts) => opts,
        Err(e) => match e.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                let _ = e.print();
                exit(0);
            }
            _ => {
                let rendered = e.to_string();
                let line = rendered.lines().next().unwrap_or("invalid arguments");
                println!("UNKNOWN - {}", line.trim_start_matches("error: "));
                exit(UNKNOWN_EXIT_CODE);
            }
        },
    };

    if opts.generate_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    match run(&opts) {
        (format, Ok(report)) => {
            println!("{}", report.render(format));
            exit(report.exit_code);
        }
        (format, Err(e)) => {
            error!("{}", e);
            println!("{}", render_failure(&e, format));
            exit(e.exit_code());
        }
    }
}
