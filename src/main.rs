use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use appliance::Appliance;
use clap::Parser;
use log::{debug, error, info, LevelFilter};
use pbstream::{verify_file, PayloadType, Verified};
use time::OffsetDateTime;

mod cli;
use crate::cli::Cli;
use crate::cli::Commands;
use crate::cli::Config;

mod date;
mod print;

type Result<T> = std::result::Result<T, Box<dyn Error>>;

fn main() -> ExitCode {
    // Parse the cli
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .parse_default_env()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("arget: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let overlay = match &cli.config {
        None => String::new(),
        Some(path) => {
            info!("Config: {}", path.display());
            fs::read_to_string(path)?
        }
    };

    let mut config = Config::parse(&overlay)?;
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    debug!("CONFIG: {:?}", config);

    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    // Offline, no runtime needed
    if let Commands::Verify {
        file,
        typ,
        pv,
        year,
        upper,
    } = &cli.command
    {
        let typ = typ
            .map(PayloadType::try_from)
            .transpose()
            .map_err(|e| format!("--type: {}", e))?;

        let res = verify_file(file, typ, pv.as_deref(), *year, *upper)?;
        report(file.display(), &res);
        return Ok(());
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let appl = Appliance::new(&config.url, config.info_ttl())?.with_rx_buf_size(config.rx_buf_size);

    rt.block_on(async {
        match &cli.command {
            Commands::Info => info_cmd(&appl).await,
            Commands::Search { patterns } => search_cmd(&appl, patterns).await,
            Commands::Get {
                pvs,
                start,
                end,
                count,
            } => {
                let count = count.unwrap_or(config.count);
                get_cmd(&appl, pvs, start, end.as_deref(), count).await
            }
            Commands::Verify { .. } => Ok(()),
        }
    })
}

fn report(name: impl std::fmt::Display, res: &Verified) {
    match res.last_timestamp {
        Some(last) => println!(
            "{}: OK {:?} {} last sample {}",
            name, res.payload_type, res.year, last
        ),
        None => println!(
            "{}: OK {:?} {} no samples in tail",
            name, res.payload_type, res.year
        ),
    }
}

async fn info_cmd(appl: &Appliance) -> Result<()> {
    info!("Appliance info from {}", appl.info_url());
    let info = appl.info().await?;

    for (k, v) in info.entries() {
        println!("{}: {}", k, v);
    }
    Ok(())
}

async fn search_cmd(appl: &Appliance, patterns: &[String]) -> Result<()> {
    let mut names = vec![];
    for pattern in patterns.iter() {
        names.extend(appl.search(pattern).await?);
    }
    names.sort();
    names.dedup();

    for name in names.iter() {
        println!("{}", name);
    }
    Ok(())
}

async fn get_cmd(
    appl: &Appliance,
    pvs: &[String],
    start: &str,
    end: Option<&str>,
    count: u64,
) -> Result<()> {
    let (start, end) = date::interval(start, end, OffsetDateTime::now_utc())?;
    info!("Query window {} to {}", start, end);

    let stdout = io::stdout();
    for pv in pvs.iter() {
        let mut out = stdout.lock();
        writeln!(out, "{}", pv)?;

        let mut failed = None;
        let n = appl
            .fetch(pv, start, end, Some(count), |batch| {
                if failed.is_none() {
                    failed = print::batch(&mut out, &batch).err();
                }
            })
            .await?;

        if let Some(e) = failed {
            return Err(e.into());
        }
        info!("{}: {} samples", pv, n);
    }
    Ok(())
}
