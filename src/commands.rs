//! Subcommand implementations
//!
//! Configuration and clients are built here once and passed down; no
//! component reaches for global state.

use crate::autostart::AutostartService;
use crate::cli::{Args, AutostartArgs, AutostartMode, Command, GlobalArgs, LiveDataArgs};
use crate::config::{Config, ConfigStore};
use crate::ekz::{ConnectorStatus, EkzClient};
use crate::error::{EkzError, Result};
use crate::logging::get_logger;
use crate::render::{PowerHistory, live_data_table, stations_table};
use crate::scheduler::{TariffScheduler, parse_cron, run_cron, wait_for_clock_sync};
use crate::tariff::{TariffSchedule, default_high_tariff_schedule};
use crate::vehicle::{TeslaMateClient, VehicleClient};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Version string including the git revision when known
pub fn version_text() -> String {
    format!(
        "ekz-tesla {}\n  Commit:  {}\n  OS/Arch: {}/{}",
        env!("APP_VERSION"),
        option_env!("GIT_SHA").unwrap_or("unknown"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Read the config file and fold flags and env on top.
///
/// The store keeps the unmodified file content for token persistence.
pub fn load_config(global: &GlobalArgs) -> Result<(Config, Arc<ConfigStore>)> {
    let (on_disk, path) = Config::load(global.config.as_deref())?;
    let mut config = on_disk.clone();
    config.apply_overrides(&global.overrides());
    config.time_zone()?;
    Ok((config, Arc::new(ConfigStore::new(path, on_disk))))
}

async fn connect(config: &Config, store: Arc<ConfigStore>) -> Result<EkzClient> {
    config.validate_credentials()?;
    let client = EkzClient::new(config, store)?;
    client.init().await?;
    Ok(client)
}

pub async fn run(
    args: Args,
    config: Config,
    store: Arc<ConfigStore>,
    cancel: CancellationToken,
) -> Result<()> {
    match args.command {
        Command::Version => {
            println!("{}", version_text());
            Ok(())
        }
        Command::List => {
            let client = connect(&config, store).await?;
            list(&client).await
        }
        Command::Start => {
            config.validate_target()?;
            let client = connect(&config, store).await?;
            remote(&client, &config, true).await
        }
        Command::Stop => {
            config.validate_target()?;
            let client = connect(&config, store).await?;
            remote(&client, &config, false).await
        }
        Command::LiveData(live_args) => {
            config.validate_target()?;
            let client = connect(&config, store).await?;
            live_data(&client, &config, &live_args, &cancel).await
        }
        Command::Autostart(autostart_args) => {
            autostart(&config, store, &autostart_args, &cancel).await
        }
    }
}

async fn list(client: &EkzClient) -> Result<()> {
    let stations = client.get_user_charging_stations().await?;
    if stations.iter().all(|s| s.charge_boxes.is_empty()) {
        println!("No charging stations found.");
        return Ok(());
    }
    println!("{}", stations_table(&stations));
    Ok(())
}

async fn remote(client: &EkzClient, config: &Config, start: bool) -> Result<()> {
    let station = &config.charging_station;
    let logger = get_logger("cli")
        .with_field("box_id", &station.box_id)
        .with_field("connector_id", station.connector_id);

    if start {
        let result = client
            .remote_start(&station.box_id, station.connector_id)
            .await?;
        logger.debug(&format!("Remote start response: {:?}", result));
        println!("Charging started");
    } else {
        let result = client
            .remote_stop(&station.box_id, station.connector_id)
            .await?;
        logger.debug(&format!("Remote stop response: {:?}", result));
        println!("Charging stopped");
    }
    Ok(())
}

async fn live_data(
    client: &EkzClient,
    config: &Config,
    args: &LiveDataArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let station = &config.charging_station;
    if !args.once && args.interval == 0 {
        return Err(EkzError::validation("interval", "must be greater than zero"));
    }
    let mut history = PowerHistory::default();

    loop {
        let live = client
            .get_live_data(&station.box_id, station.connector_id, ConnectorStatus::Any)
            .await?;
        let now = Local::now();
        history.record(&live, now);

        if args.once {
            println!("{}", live_data_table(&live, now));
            return Ok(());
        }

        // clear screen, cursor home
        print!("\x1b[H\x1b[2J");
        println!("{}", live_data_table(&live, now));
        if let Some(trend) = history.trend() {
            println!("\n{}", trend);
        }
        println!("\nPress Ctrl+C to exit");

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(Duration::from_secs(args.interval)) => {}
        }
    }
}

/// Car id and TeslaMate client, checked before any network activity
fn vehicle_source(args: &AutostartArgs) -> Result<(u32, Arc<dyn VehicleClient>)> {
    let car_id = args.vehicle.car_id.ok_or_else(|| {
        EkzError::validation("car_id", "is required (use --car-id or TESLAMATE_CAR_ID)")
    })?;
    let url = args
        .vehicle
        .teslamate_api_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| {
            EkzError::validation(
                "teslamate_api_url",
                "is required (use --teslamate-api-url or TESLAMATE_API_URL)",
            )
        })?;
    let vehicle: Arc<dyn VehicleClient> = Arc::new(TeslaMateClient::new(url)?);
    Ok((car_id, vehicle))
}

async fn autostart(
    config: &Config,
    store: Arc<ConfigStore>,
    args: &AutostartArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let logger = get_logger("cli");
    config.validate_charging_station()?;
    let (car_id, vehicle) = vehicle_source(args)?;
    let build_service = |client: EkzClient| {
        AutostartService::new(
            vehicle.clone(),
            Arc::new(client),
            config.charging_station.clone(),
            car_id,
            args.vehicle.maximum_charge,
        )
    };

    match &args.mode {
        AutostartMode::Once => {
            let service = build_service(connect(config, store).await?);
            let decision = service.try_autostart().await?;
            println!("{}", decision);
            Ok(())
        }
        AutostartMode::Scheduled { cron } => {
            let schedule = parse_cron(cron)?;
            wait_for_clock_sync(cancel).await;
            let service = build_service(connect(config, store).await?);

            println!("Starting scheduled autostart with cron: {}", cron);
            run_cron(&schedule, config.time_zone()?, &service, cancel).await
        }
        AutostartMode::Smart {
            high_tariff_times,
            check_interval,
        } => {
            let (label, ranges) = if high_tariff_times.is_empty() {
                ("default", default_high_tariff_schedule())
            } else {
                ("custom", high_tariff_times.clone())
            };
            if *check_interval == 0 {
                return Err(EkzError::validation(
                    "check_interval",
                    "must be greater than zero",
                ));
            }

            wait_for_clock_sync(cancel).await;
            let service = Arc::new(build_service(connect(config, store).await?));
            let scheduler = TariffScheduler::new(
                service,
                TariffSchedule::new(ranges, config.time_zone()?),
            )
            .with_interval(Duration::from_secs(*check_interval));

            let schedule = scheduler.schedule();
            let shown: Vec<String> = schedule.ranges().iter().map(|r| r.to_string()).collect();
            println!("Using {} high tariff schedule: {}", label, shown.join("; "));

            scheduler.start(cancel)?;
            let now = schedule.now();
            let next_low = schedule.next_low_tariff(now);
            if next_low == now {
                println!("Currently in low tariff period - charging attempts will begin");
            } else {
                println!(
                    "Next low tariff period starts at: {}",
                    next_low.format("%Y-%m-%d %H:%M:%S %a")
                );
            }
            println!("Smart autostart scheduler started. Press Ctrl+C to stop");

            cancel.cancelled().await;
            logger.info("Shutting down scheduler");
            scheduler.stop().await;
            println!("Smart autostart scheduler stopped");
            Ok(())
        }
    }
}
