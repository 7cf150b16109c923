use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, error};

use pacengine::config::load_config;
use pacengine::engine::extract_host;
use pacengine::{Engine, ProxyDecision, ResolverVariant};

/// 从标准输入读取 PAC 脚本的上限
const MAX_STDIN_SCRIPT: u64 = 1024 * 1024;

/// Evaluate a PAC file for a URL (or a list of URLs).
#[derive(Parser, Debug)]
#[command(name = "pactester", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// PAC file to test ('-' reads from standard input)
    #[arg(short = 'p', value_name = "PACFILE", required_unless_present = "version")]
    pacfile: Option<String>,

    /// URL to test
    #[arg(short = 'u', value_name = "URL", required_unless_present_any = ["urlslist", "version"])]
    url: Option<String>,

    /// Host part of the URL (derived from the URL when omitted)
    #[arg(short = 'h', value_name = "HOST")]
    host: Option<String>,

    /// Client IP address returned by myIpAddress()
    #[arg(short = 'c', value_name = "CLIENT_IP")]
    client_ip: Option<String>,

    /// Accepted for compatibility; Microsoft extensions are enabled by default
    #[arg(short = 'e')]
    extensions: bool,

    /// Hide the Microsoft extension functions from the script
    #[arg(long = "disable-ms-ext", conflicts_with = "extensions")]
    disable_ms_ext: bool,

    /// File with one URL per line ('#' lines are echoed)
    #[arg(short = 'f', value_name = "URLSLIST", conflicts_with = "url")]
    urlslist: Option<PathBuf>,

    /// DNS resolver: system, pluggable or none
    #[arg(long = "dns", value_name = "VARIANT")]
    dns: Option<ResolverVariant>,

    /// Comma-separated nameservers for the pluggable resolver
    #[arg(long = "dns-servers", value_name = "LIST", value_delimiter = ',')]
    dns_servers: Vec<String>,

    /// Comma-separated search domains for the pluggable resolver
    #[arg(long = "dns-domains", value_name = "LIST", value_delimiter = ',')]
    dns_domains: Vec<String>,

    /// YAML engine config applied before the command-line overrides
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the parsed proxy candidates instead of the raw string
    #[arg(long = "structured")]
    structured: bool,

    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Print help
    #[arg(long = "help", action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if cli.version {
        println!("{}", pacengine::version());
        return ExitCode::SUCCESS;
    }

    let engine = Engine::new();
    let outcome = engine.init().map_err(anyhow::Error::from).and_then(|_| run(&engine, &cli));
    if engine.is_ready() {
        let _ = engine.cleanup();
    }

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pactester failed");
            eprintln!("pactester: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(engine: &Engine, cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.config {
        let config = load_config(path).with_context(|| format!("loading {}", path.display()))?;
        engine.apply_config(config)?;
    }
    if cli.extensions {
        engine.enable_microsoft_extensions()?;
    }
    if cli.disable_ms_ext {
        engine.disable_microsoft_extensions()?;
    }
    if let Some(variant) = cli.dns {
        engine.set_dns_resolver_variant(variant)?;
    }
    if !cli.dns_servers.is_empty() {
        engine.set_dns_servers(cli.dns_servers.iter().cloned())?;
    }
    if !cli.dns_domains.is_empty() {
        engine.set_dns_search_domains(cli.dns_domains.iter().cloned())?;
    }

    let pacfile = cli.pacfile.as_deref().unwrap_or("-");
    if pacfile == "-" {
        let mut script = String::new();
        std::io::stdin()
            .take(MAX_STDIN_SCRIPT + 1)
            .read_to_string(&mut script)
            .context("reading PAC script from stdin")?;
        if script.len() as u64 > MAX_STDIN_SCRIPT {
            bail!("input script is too big; maximum allowed size is {} bytes", MAX_STDIN_SCRIPT);
        }
        engine.parse_script(&script).context("could not parse the PAC script")?;
    } else {
        engine
            .parse_file(pacfile)
            .with_context(|| format!("could not parse the PAC file: {}", pacfile))?;
    }

    if let Some(ip) = &cli.client_ip {
        engine.set_my_ip(ip)?;
    }

    if let Some(url) = &cli.url {
        let decision = engine
            .find_proxy(url, cli.host.as_deref())
            .with_context(|| format!("problem in finding proxy for {}", url))?;
        print_decision(None, &decision, cli.structured)?;
    } else if let Some(list) = &cli.urlslist {
        run_urls_list(engine, list, cli.structured)?;
    }
    Ok(())
}

fn run_urls_list(engine: &Engine, list: &Path, structured: bool) -> Result<()> {
    let file = std::fs::File::open(list)
        .with_context(|| format!("could not open urlslist: {}", list.display()))?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim_start_matches([' ', '\t']);
        if line.starts_with('#') {
            println!("{}", line);
            continue;
        }
        let url = line.split_whitespace().next().unwrap_or("");
        let host = match extract_host(url) {
            Ok(host) => host,
            Err(e) => {
                debug!(url = url, error = %e, "skipping line");
                continue;
            }
        };
        let decision = engine
            .find_proxy(url, Some(&host))
            .with_context(|| format!("problem in finding proxy for {}", url))?;
        print_decision(Some(url), &decision, structured)?;
    }
    Ok(())
}

fn print_decision(url: Option<&str>, raw: &str, structured: bool) -> Result<()> {
    let rendered = if structured {
        let decision = ProxyDecision::parse(raw)?;
        decision
            .candidates()
            .iter()
            .map(|c| match c.authority() {
                Some(authority) => format!("{}\t{}", c.kind.as_str(), authority),
                None => c.kind.as_str().to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        raw.to_string()
    };
    match url {
        Some(url) => println!("{} : {}", url, rendered),
        None => println!("{}", rendered),
    }
    Ok(())
}
