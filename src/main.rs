use std::{
    error::Error,
    io::{self, BufRead},
    path::PathBuf,
    sync::{mpsc, Arc, Mutex, PoisonError},
    thread,
};

use chrono::{Local, NaiveTime};
use clap::{command, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use roosty_scheduler::{
    backup::Backup,
    clock::SystemClock,
    communication::CoordinatorHandle,
    config::{Config, ConfigFile, Persistence},
    notify::LogNotifier,
    sound::{RodioOutput, SoundEngine},
    Alarm, AlarmBuilder, AlarmId, Coordinator, SoundSpec, TimeOfDay, Volume, Weekdays,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Subcommand)]
enum Command {
    /// write a fresh config file
    Init {
        #[clap(long, short)]
        force: bool,
        /// start with a few example alarms
        #[clap(long)]
        demo: bool,
    },
    /// import a sound file into the sound library
    NewSound { name: String, path: PathBuf },
    /// list the imported sounds
    Sounds,
    NewAlarm {
        name: String,
        /// `07:30`, `7:30 AM` or `07:30 PM`
        time: String,
        /// a builtin pattern such as `morning-chime`, a path or a `blob:` locator
        sound: String,
        /// `workdays`, `daily`, `none` or a list like `mon,wed,fri`
        #[clap(long, short, default_value = "workdays")]
        days: String,
        #[clap(long, short, default_value_t = 5)]
        volume: u8,
        /// stop whatever is playing instead of waiting for it
        #[clap(long, short)]
        interrupt: bool,
    },
    List,
    Remove { id: u64 },
    /// enable or disable one alarm
    Toggle { id: u64 },
    /// enable or disable every alarm at once
    All { state: Switch },
    /// play a sound once
    Test {
        sound: String,
        #[clap(long, short, default_value_t = 5)]
        volume: u8,
    },
    Export { path: Option<PathBuf> },
    Import { path: PathBuf },
    /// run the scheduler in the foreground (the default)
    Run,
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    simple_file_logger::init_logger!("roosty_scheduler")
        .map_err(|e| format!("couldn't initialize logger: {e:?}"))?;

    let args = Args::parse();
    let file = ConfigFile::new(Config::config_path()?);
    match args.command.unwrap_or(Command::Run) {
        Command::Init { force, demo } => {
            if force || !Config::is_config_present() {
                let config = if demo { Config::demo() } else { Config::new() };
                config.save(&file.path)?;
                std::fs::create_dir_all(Config::sounds_path()?)?;
                println!("wrote {}", file.path.display());
            } else {
                println!(
                    "{} already exists, use --force to overwrite it",
                    file.path.display()
                );
            }
        }
        Command::NewSound { name, path } => {
            let config = file.load_or_default()?;
            let stored = config.library(Config::sounds_path()?).import(&name, &path)?;
            println!("added {stored}, use it as {}", stored.locator());
        }
        Command::Sounds => {
            let config = file.load_or_default()?;
            for pattern in roosty_scheduler::sound::Pattern::ALL {
                println!("{:<14} {}", pattern.id(), pattern.display_name());
            }
            for sound in config.library(Config::sounds_path()?).list()? {
                println!("{:<14} {sound}", sound.locator());
            }
        }
        Command::NewAlarm {
            name,
            time,
            sound,
            days,
            volume,
            interrupt,
        } => {
            let mut config = file.load_or_default()?;
            let time: TimeOfDay = time.parse()?;
            let weekdays: Weekdays = days.parse()?;
            let sound: SoundSpec = sound.parse()?;
            if let SoundSpec::External { locator } = &sound {
                if let Err(e) = config.library(Config::sounds_path()?).resolve(locator) {
                    warn!("{e}");
                    eprintln!("warning: {e}");
                }
            }
            for conflict in config.alarms.conflicts(time, weekdays, None) {
                eprintln!(
                    "warning: alarm {} already rings at {conflict}",
                    conflict.id
                );
            }
            let id = config.alarms.add(
                AlarmBuilder {
                    name,
                    sound,
                    volume: Volume::new(volume)?,
                    interrupts_others: interrupt,
                    ..AlarmBuilder::default()
                }
                .time(time)
                .weekdays(weekdays),
            )?;
            config.save(&file.path)?;
            println!("added alarm {id}");
        }
        Command::List => {
            let config = file.load_or_default()?;
            if !config.all_enabled {
                println!("all alarms are disabled");
            }
            for alarm in config.alarms.sorted_by_time() {
                println!("{}", list_line(alarm, &config.time_format));
            }
        }
        Command::Remove { id } => {
            let mut config = file.load_or_default()?;
            let alarm = config
                .alarms
                .remove(AlarmId(id))
                .ok_or_else(|| format!("no alarm {}", AlarmId(id)))?;
            config.save(&file.path)?;
            println!("removed {}", alarm.describe());
        }
        Command::Toggle { id } => {
            let mut config = file.load_or_default()?;
            let alarm = config
                .alarms
                .get_mut(AlarmId(id))
                .ok_or_else(|| format!("no alarm {}", AlarmId(id)))?;
            alarm.enabled = !alarm.enabled;
            let enabled = alarm.enabled;
            config.save(&file.path)?;
            println!(
                "alarm {} {}",
                AlarmId(id),
                if enabled { "enabled" } else { "disabled" }
            );
        }
        Command::All { state } => {
            let mut config = file.load_or_default()?;
            config.all_enabled = matches!(state, Switch::On);
            config.save(&file.path)?;
        }
        Command::Test { sound, volume } => {
            let config = file.load_or_default()?;
            play_once(
                &sound.parse::<SoundSpec>()?,
                Volume::new(volume)?,
                config.library(Config::sounds_path()?),
            )?;
        }
        Command::Export { path } => {
            let config = file.load_or_default()?;
            let now = Local::now();
            let path = path.unwrap_or_else(|| PathBuf::from(Backup::file_name(now.date_naive())));
            Backup::of(&config, now.to_rfc3339()).write(&path)?;
            println!("exported {} alarms to {}", config.alarms.len(), path.display());
        }
        Command::Import { path } => {
            let mut config = file.load_or_default()?;
            let backup = Backup::read(&path)?;
            println!(
                "replacing {} alarms with {} from {}",
                config.alarms.len(),
                backup.alarms.len(),
                backup.export_date.as_deref().unwrap_or("an unknown date")
            );
            backup.restore(&mut config);
            config.save(&file.path)?;
        }
        Command::Run => run(file)?,
    }
    Ok(())
}

fn list_line(alarm: &Alarm, time_format: &str) -> String {
    let time = NaiveTime::from_hms_opt(alarm.time.hour().into(), alarm.time.minute().into(), 0)
        .map_or_else(|| alarm.time.to_string(), |t| t.format(time_format).to_string());
    format!(
        "{:>4} {time} {:<16} {:<18} {:<20} {}{}{}",
        alarm.id.to_string(),
        alarm.display_name(),
        alarm.weekdays.to_string(),
        alarm.sound.to_string(),
        alarm.volume,
        if alarm.interrupts_others { " interrupts" } else { "" },
        if alarm.enabled { "" } else { " (off)" },
    )
}

/// Plays `sound` through the speakers and blocks until it ends.
fn play_once(
    sound: &SoundSpec,
    volume: Volume,
    library: roosty_scheduler::library::SoundLibrary,
) -> Result<(), Box<dyn Error>> {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let mut engine = SoundEngine::new(
        RodioOutput::new(),
        library,
        Arc::new(move |handle| {
            let _ = tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(handle);
        }),
    );
    let handle = engine.start(sound, volume, false)?;
    println!("playing {sound} at {volume}");
    let finished = rx.recv()?;
    engine.finished(finished);
    info!("{handle} done");
    Ok(())
}

fn run(file: ConfigFile) -> Result<(), Box<dyn Error>> {
    let config = file.load_or_default()?;
    let library = config.library(Config::sounds_path()?);
    let persistence: Box<dyn Persistence> = Box::new(file);
    let mut coordinator = Coordinator::new(
        config,
        persistence,
        RodioOutput::new(),
        library,
        Box::new(LogNotifier),
        SystemClock,
    );
    let alerts = coordinator.subscribe();
    thread::spawn(move || {
        for alert in alerts {
            println!("{alert}");
        }
    });
    let remote = coordinator.remote();
    thread::spawn(move || read_commands(&remote));
    println!("scheduler running, commands: stop, snooze, play <id>, status, quit");
    coordinator.run();
    Ok(())
}

/// Forwards commands typed on stdin. End of input stops the scheduler.
fn read_commands(remote: &CoordinatorHandle) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let mut words = line.split_whitespace();
        let sent = match (words.next(), words.next()) {
            (None, _) => continue,
            (Some("stop" | "dismiss"), _) => remote.dismiss(),
            (Some("snooze"), _) => remote.snooze(),
            (Some("play"), Some(id)) => match id.trim_start_matches('#').parse() {
                Ok(id) => remote.play_pending_now(AlarmId(id)),
                Err(_) => {
                    eprintln!("not an alarm id: {id}");
                    continue;
                }
            },
            (Some("status"), _) => remote.status().map(|status| {
                match &status.active {
                    Some(alarm) => println!("ringing: {}", alarm.describe()),
                    None => println!("nothing ringing"),
                }
                for alarm in &status.pending {
                    println!("waiting: {} {}", alarm.id, alarm.describe());
                }
                if !status.all_enabled {
                    println!("all alarms are disabled");
                }
            }),
            (Some("quit" | "exit"), _) => {
                let _ = remote.shutdown();
                return;
            }
            (Some(other), _) => {
                eprintln!("unknown command {other:?}");
                continue;
            }
        };
        if sent.is_err() {
            return;
        }
    }
    let _ = remote.shutdown();
}
