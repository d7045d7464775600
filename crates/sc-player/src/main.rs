//! StageCast engine executable
//!
//! Loads a spatial scene and a speaker layout, streams the sources to the
//! output device with DBAP panning, and serves live controls over OSC.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{ArgGroup, Parser};

use sc_core::db_to_linear;
use sc_engine::{
    Engine, EngineConfig, EngineError, FOCUS_MAX, FOCUS_MIN, GAIN_MAX, GAIN_MIN, InitialParams,
    MIX_TRIM_DB, SourceInput, list_output_devices,
};
use sc_osc::{OscError, ParameterServer};
use sc_scene::{Scene, SceneError, SpeakerLayout};

// Exit codes per the launcher contract
const EXIT_CONFIG: u8 = 1;
const EXIT_DEVICE: u8 = 2;
const EXIT_SOURCE: u8 = 3;

/// Monitor loop tick
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "sc-player", version, about = "Real-time spatial scene playback")]
#[command(group(ArgGroup::new("input").required(true).args(["sources", "adm"])))]
struct Cli {
    /// Speaker layout JSON
    #[arg(long)]
    layout: PathBuf,

    /// Scene JSON produced by the preprocessor
    #[arg(long)]
    scene: PathBuf,

    /// Directory of per-source mono WAVs
    #[arg(long)]
    sources: Option<PathBuf>,

    /// Multichannel interleaved WAV
    #[arg(long)]
    adm: Option<PathBuf>,

    /// Output remap CSV (absent = identity)
    #[arg(long)]
    remap: Option<PathBuf>,

    /// Master gain (0.1 - 3.0)
    #[arg(long, default_value_t = 0.5)]
    gain: f32,

    /// DBAP focus exponent (0.2 - 5.0)
    #[arg(long, default_value_t = 1.5)]
    focus: f32,

    /// Device block size in frames (power of two)
    #[arg(long, default_value_t = 512)]
    buffersize: u32,

    /// Loudspeaker trim in dB (-10 - 10)
    #[arg(long = "speaker_mix", default_value_t = 0.0)]
    speaker_mix: f32,

    /// Subwoofer trim in dB (-10 - 10)
    #[arg(long = "sub_mix", default_value_t = 0.0)]
    sub_mix: f32,

    /// Enable focus auto-compensation
    #[arg(long = "auto_compensation")]
    auto_compensation: bool,

    /// Elevation handling: 0 rescale Atmos-up, 1 clamp, 2 rescale full sphere
    #[arg(long = "elevation_mode", default_value_t = 0)]
    elevation_mode: u8,

    /// OSC control port
    #[arg(long = "osc_port", default_value_t = 9009)]
    osc_port: u16,

    /// Output device by name (default device otherwise)
    #[arg(long)]
    device: Option<String>,

    /// List output devices and exit
    #[arg(long = "list-devices")]
    list_devices: bool,
}

fn validate(cli: &Cli) -> Result<(), String> {
    if !cli.buffersize.is_power_of_two() || cli.buffersize == 0 {
        return Err(format!(
            "--buffersize must be a power of two, got {}",
            cli.buffersize
        ));
    }
    if !(GAIN_MIN..=GAIN_MAX).contains(&cli.gain) {
        return Err(format!(
            "--gain out of range [{}, {}]: {}",
            GAIN_MIN, GAIN_MAX, cli.gain
        ));
    }
    if !(FOCUS_MIN..=FOCUS_MAX).contains(&cli.focus) {
        return Err(format!(
            "--focus out of range [{}, {}]: {}",
            FOCUS_MIN, FOCUS_MAX, cli.focus
        ));
    }
    if cli.speaker_mix.abs() > MIX_TRIM_DB {
        return Err(format!("--speaker_mix out of range +-{} dB", MIX_TRIM_DB));
    }
    if cli.sub_mix.abs() > MIX_TRIM_DB {
        return Err(format!("--sub_mix out of range +-{} dB", MIX_TRIM_DB));
    }
    if cli.elevation_mode > 2 {
        return Err(format!(
            "--elevation_mode must be 0, 1 or 2, got {}",
            cli.elevation_mode
        ));
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            // --help / --version land here too, with exit 0
            let code = if error.use_stderr() { EXIT_CONFIG } else { 0 };
            let _ = error.print();
            return ExitCode::from(code);
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("sc-player: {:#}", error);
            ExitCode::from(exit_code_for(&error))
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> u8 {
    if let Some(engine_error) = error.downcast_ref::<EngineError>() {
        return match engine_error {
            EngineError::NoDevice
            | EngineError::DeviceNotFound(_)
            | EngineError::DeviceConfig(_)
            | EngineError::StreamBuild(_)
            | EngineError::Stream(_) => EXIT_DEVICE,
            EngineError::Remap(_) => EXIT_CONFIG,
            EngineError::Source(_) => EXIT_SOURCE,
        };
    }
    if error.downcast_ref::<OscError>().is_some() {
        return EXIT_DEVICE;
    }
    if error.downcast_ref::<SceneError>().is_some() {
        return EXIT_CONFIG;
    }
    EXIT_CONFIG
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.list_devices {
        for device in list_output_devices()? {
            println!(
                "{}{} ({} ch)",
                if device.is_default { "* " } else { "  " },
                device.name,
                device.output_channels
            );
        }
        return Ok(());
    }

    validate(&cli).map_err(|message| anyhow::anyhow!(message))?;

    let scene = Scene::load(&cli.scene)?;
    let layout = SpeakerLayout::load(&cli.layout)?;
    log::info!(
        "scene '{}': {} sources @ {} Hz; layout '{}': {} speakers, {} subwoofers",
        cli.scene.display(),
        scene.sources.len(),
        scene.sample_rate,
        cli.layout.display(),
        layout.speaker_count(),
        layout.subwoofers.len()
    );

    let input = match (&cli.sources, &cli.adm) {
        (Some(dir), None) => SourceInput::MonoDir(dir.clone()),
        (None, Some(path)) => SourceInput::Multichannel(path.clone()),
        _ => unreachable!("clap enforces exactly one input"),
    };

    let config = EngineConfig {
        buffer_size: cli.buffersize as usize,
        initial: InitialParams {
            master_gain: cli.gain,
            focus: cli.focus,
            speaker_mix: db_to_linear(cli.speaker_mix),
            sub_mix: db_to_linear(cli.sub_mix),
            auto_comp: cli.auto_compensation,
            elevation_mode: cli.elevation_mode,
        },
        device: cli.device.clone(),
        remap_path: cli.remap.clone(),
        multichannel_map: Default::default(),
    };

    let mut engine = Engine::new(&scene, &layout, input, config)?;
    let mut server = ParameterServer::start(cli.osc_port, engine.params())?;

    // Auto-comp requested on the command line runs once up front
    if cli.auto_compensation {
        engine.params().request_auto_comp();
    }

    engine.start()?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_running = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_running.store(false, Ordering::Relaxed);
    })?;

    log::info!("playing; Ctrl-C to stop");
    while running.load(Ordering::Relaxed) {
        engine.poll();
        std::thread::sleep(POLL_INTERVAL);
    }
    log::info!("stopping at {:.1}s", engine.position_seconds());

    // Mandatory teardown order: audio callback, loader thread, control
    // listener, file handles.
    engine.stop_audio();
    engine.stop_loader();
    server.stop();
    engine.close_files();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("sc-player").chain(args.iter().copied()))
    }

    #[test]
    fn sources_and_adm_are_mutually_exclusive() {
        assert!(
            parse(&["--layout", "l.json", "--scene", "s.json", "--sources", "dir"]).is_ok()
        );
        assert!(parse(&["--layout", "l.json", "--scene", "s.json", "--adm", "a.wav"]).is_ok());
        // Neither
        assert!(parse(&["--layout", "l.json", "--scene", "s.json"]).is_err());
        // Both
        assert!(
            parse(&[
                "--layout", "l.json", "--scene", "s.json", "--sources", "dir", "--adm", "a.wav"
            ])
            .is_err()
        );
    }

    #[test]
    fn defaults_match_the_contract() {
        let cli =
            parse(&["--layout", "l.json", "--scene", "s.json", "--sources", "dir"]).unwrap();
        assert_eq!(cli.gain, 0.5);
        assert_eq!(cli.focus, 1.5);
        assert_eq!(cli.buffersize, 512);
        assert_eq!(cli.speaker_mix, 0.0);
        assert_eq!(cli.sub_mix, 0.0);
        assert_eq!(cli.elevation_mode, 0);
        assert_eq!(cli.osc_port, 9009);
        assert!(!cli.auto_compensation);
        assert!(validate(&cli).is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cli =
            parse(&["--layout", "l.json", "--scene", "s.json", "--sources", "dir"]).unwrap();

        cli.buffersize = 500;
        assert!(validate(&cli).is_err());
        cli.buffersize = 512;

        cli.gain = 5.0;
        assert!(validate(&cli).is_err());
        cli.gain = 0.5;

        cli.focus = 0.0;
        assert!(validate(&cli).is_err());
        cli.focus = 1.5;

        cli.speaker_mix = -12.0;
        assert!(validate(&cli).is_err());
        cli.speaker_mix = 0.0;

        cli.elevation_mode = 3;
        assert!(validate(&cli).is_err());
        cli.elevation_mode = 0;

        assert!(validate(&cli).is_ok());
    }
}
