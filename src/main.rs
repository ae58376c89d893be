use std::{net::SocketAddr, path::Path, process, sync::Arc};

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tokio::{io::BufReader, sync::mpsc};

use qasaplug::{
    console::Console,
    datatypes::DeviceData,
    devices::{parse_addr, Plug},
    discovery,
    error::{Error, Result},
    logging,
    protocol::DefaultProtocol,
    KasaClient, Scheduler, Settings,
};

fn settings(matches: &ArgMatches) -> Result<Settings> {
    let mut settings = Settings::load(matches.value_of("config").map(Path::new))?;

    if let Some(interval) = matches.value_of("interval") {
        settings.refresh_interval_secs = interval
            .parse()
            .map_err(|_| Error::Other(format!("Invalid interval '{}'", interval)))?;
    }
    if matches.is_present("show-address") {
        settings.show_address = true;
    }
    if matches.is_present("hide-power") {
        settings.show_power = false;
    }
    if matches.is_present("no-auto-reconnect") {
        settings.auto_reconnect = false;
    }
    if matches.is_present("no-color") {
        settings.color = false;
    }
    Ok(settings)
}

async fn command_run(settings: Settings) -> Result<()> {
    let client = KasaClient::new(settings.discovery_timeout(), settings.request_timeout());
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let scheduler = Arc::new(Scheduler::new(Arc::new(client), settings, events_tx));

    let console = Console::new(scheduler, events_rx, std::io::stdout(), std::io::stderr());
    console.run(BufReader::new(tokio::io::stdin())).await
}

async fn command_discover(settings: Settings, json: bool) -> Result<()> {
    for (addr, data) in discovery::with_timeout(settings.discovery_timeout()).await? {
        if json {
            println!("{}", serde_json::to_string(&data)?);
        } else {
            discover_print_human(addr, data);
        }
    }
    Ok(())
}

fn discover_print_human(addr: SocketAddr, data: DeviceData) {
    let watts = data
        .realtime()
        .and_then(|realtime| realtime.watts())
        .map(|watts| format!("{:.1} W", watts))
        .unwrap_or_default();
    let sysinfo = data.sysinfo();
    let state = match sysinfo.is_on() {
        Some(true) => "on",
        Some(false) => "off",
        None => "-",
    };
    println!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        addr,
        pad(&sysinfo.alias, 18),
        pad(&sysinfo.hw_type, 20),
        pad(&sysinfo.model, 12),
        pad(state, 3),
        watts,
    );
}

fn pad(value: &str, padding: usize) -> String {
    let pad = " ".repeat(padding.saturating_sub(value.len()));
    format!("{}{}", value, pad)
}

async fn command_switch(settings: Settings, addr: &str, state: &str) -> Result<()> {
    let addr = parse_addr(addr).map_err(|err| Error::Other(format!("{}: {}", addr, err)))?;
    let plug = Plug::new(addr, Arc::new(DefaultProtocol::new(settings.request_timeout())));
    plug.set_relay_state(state == "on").await?;
    println!("{} switched {}", plug.addr(), state);
    Ok(())
}

async fn run(matches: ArgMatches<'_>) -> Result<()> {
    let settings = settings(&matches)?;
    match matches.subcommand() {
        ("discover", Some(sub)) => command_discover(settings, sub.is_present("json")).await,
        ("switch", Some(sub)) => {
            let addr = sub.value_of("address").unwrap_or_default();
            let state = sub.value_of("state").unwrap_or("on");
            command_switch(settings, addr, state).await
        }
        _ => command_run(settings).await,
    }
}

#[tokio::main]
async fn main() {
    let matches = App::new("qasaplug")
        .version(env!("CARGO_PKG_VERSION"))
        .author("ecki")
        .about("Discover, switch and monitor TPLink Kasa smart plugs on the local network.")
        .setting(AppSettings::VersionlessSubcommands)
        .arg(Arg::with_name("config")
            .short("c")
            .long("config")
            .takes_value(true)
            .value_name("FILE")
            .global(true)
            .help("Read settings from FILE instead of the default location.")
        )
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .global(true)
            .help("Log more; repeat for more detail.")
        )
        .arg(Arg::with_name("interval")
            .long("interval")
            .takes_value(true)
            .value_name("SECS")
            .global(true)
            .help("Seconds between automatic refreshes.")
        )
        .arg(Arg::with_name("show-address")
            .long("show-address")
            .global(true)
            .help("Show each plug's IP address.")
        )
        .arg(Arg::with_name("hide-power")
            .long("hide-power")
            .global(true)
            .help("Do not show power draw.")
        )
        .arg(Arg::with_name("no-auto-reconnect")
            .long("no-auto-reconnect")
            .global(true)
            .help("Do not poll plugs that missed a discovery broadcast.")
        )
        .arg(Arg::with_name("no-color")
            .long("no-color")
            .global(true)
            .help("Plain output without colours.")
        )
        .subcommand(SubCommand::with_name("run")
            .about("Show plugs and switch them interactively (default)")
        )
        .subcommand(SubCommand::with_name("discover")
            .about("Discover devices on the local network")
            .arg(Arg::with_name("json")
                .long("json")
                .takes_value(false)
                .help("Respond with JSON.")
            )
        )
        .subcommand(SubCommand::with_name("switch")
            .about("Switch one plug on or off")
            .arg(Arg::with_name("address")
                .required(true)
                .help("IP address of the plug, optionally with port")
            )
            .arg(Arg::with_name("state")
                .required(true)
                .possible_values(&["on", "off"])
            )
        )
        .get_matches();

    logging::init(matches.occurrences_of("verbose"));

    if let Err(err) = run(matches).await {
        eprintln!("qasaplug: {}", err);
        process::exit(1);
    }
}
