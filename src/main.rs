use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{info, warn};

use meshvoice::codec::vocoder;
use meshvoice::{
    AppConfig, AudioClip, AudioEncoder, ChunkSize, ConfigManager, EncodedPayload, FragmentationTransmitter,
    LoopbackMesh, MeshConnector, PayloadDecoder, QualityTier, Reaper, ReassemblyStore, ReceiverEvent, VoiceArchive,
    VoiceReceiver,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let quality_arg = || {
        Arg::new("quality")
            .long("quality")
            .short('q')
            .value_name("TIER")
            .help("Quality tier: ultra-low, very-low, low (defaults to the configured tier)")
            .value_parser(|s: &str| s.parse::<QualityTier>())
    };

    let matches = Command::new("meshvoice")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Voice clips over a lossy mesh radio link")
        .subcommand_required(true)
        .subcommand(
            Command::new("encode")
                .about("Encode a WAV clip into a voice payload")
                .arg(Arg::new("input").required(true).value_parser(clap::value_parser!(PathBuf)))
                .arg(Arg::new("output").required(true).value_parser(clap::value_parser!(PathBuf)))
                .arg(quality_arg())
                .arg(
                    Arg::new("legacy")
                        .long("legacy")
                        .help("Skip the vocoder and use zlib-compressed PCM")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("decode")
                .about("Decode a voice payload of either format to WAV")
                .arg(Arg::new("input").required(true).value_parser(clap::value_parser!(PathBuf)))
                .arg(Arg::new("output").required(true).value_parser(clap::value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("loopback")
                .about("Send a clip across an in-process two-node mesh and save what arrives")
                .arg(Arg::new("input").required(true).value_parser(clap::value_parser!(PathBuf)))
                .arg(quality_arg())
                .arg(
                    Arg::new("chunk-size")
                        .long("chunk-size")
                        .value_name("SIZE")
                        .help("Fragment budget preset: small (150), medium (180), large (200)")
                        .value_parser(|s: &str| s.parse::<ChunkSize>()),
                ),
        )
        .subcommand(Command::new("config").about("Show the active configuration"))
        .get_matches();

    let manager = match ConfigManager::new() {
        Ok(manager) => manager,
        Err(e) => {
            warn!("Failed to load configuration: {:#}. Using defaults.", e);
            ConfigManager::with_config(AppConfig::default())
        }
    };

    match matches.subcommand() {
        Some(("encode", args)) => encode(manager.get_config(), args),
        Some(("decode", args)) => decode(args),
        Some(("loopback", args)) => loopback(manager.get_config(), args).await,
        Some(("config", _)) => show_config(&manager),
        _ => Ok(()),
    }
}

fn path_arg<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a PathBuf> {
    args.get_one::<PathBuf>(name)
        .with_context(|| format!("Missing <{}> argument", name))
}

fn quality(config: &AppConfig, args: &ArgMatches) -> QualityTier {
    args.get_one::<QualityTier>("quality").copied().unwrap_or(config.audio.quality)
}

fn encode(config: &AppConfig, args: &ArgMatches) -> Result<()> {
    let input = path_arg(args, "input")?;
    let output = path_arg(args, "output")?;
    let tier = quality(config, args);

    let encoder = if args.get_flag("legacy") {
        AudioEncoder::legacy_only()
    } else if config.transmission.prefer_vocoder && !vocoder::is_available() {
        warn!("Built without the vocoder feature; encoding with legacy compression");
        AudioEncoder::legacy_only()
    } else {
        AudioEncoder::with_vocoder(config.transmission.prefer_vocoder)
    };

    let payload = encoder
        .encode_file(input, &tier.profile())
        .with_context(|| format!("Failed to encode {:?}", input))?;
    fs::write(output, payload.as_bytes()).with_context(|| format!("Failed to write {:?}", output))?;

    println!(
        "{} -> {:?}: {} bytes ({:?}, {} quality, {} base64 chars)",
        input.display(),
        output,
        payload.len(),
        payload.kind()?,
        tier,
        payload.to_base64().len()
    );
    Ok(())
}

fn decode(args: &ArgMatches) -> Result<()> {
    let input = path_arg(args, "input")?;
    let output = path_arg(args, "output")?;

    let payload = EncodedPayload::new(fs::read(input).with_context(|| format!("Failed to read {:?}", input))?);
    let clip = PayloadDecoder::new()
        .decode(payload.as_bytes())
        .with_context(|| format!("Failed to decode {:?}", input))?;
    clip.write_wav(output).with_context(|| format!("Failed to write {:?}", output))?;

    println!(
        "{} -> {}: {:.2}s at {} Hz, {}-bit",
        input.display(),
        output.display(),
        clip.duration().as_secs_f32(),
        clip.sample_rate,
        clip.sample_width * 8
    );
    Ok(())
}

async fn loopback(config: &AppConfig, args: &ArgMatches) -> Result<()> {
    let input = path_arg(args, "input")?;
    let tier = quality(config, args);
    let chunk_size = args
        .get_one::<ChunkSize>("chunk-size")
        .copied()
        .unwrap_or(config.transmission.chunk_size);

    let clip = AudioClip::read_wav(input).with_context(|| format!("Failed to read {:?}", input))?;
    let payload = AudioEncoder::with_vocoder(config.transmission.prefer_vocoder).encode(&clip, &tier.profile())?;

    let mesh = LoopbackMesh::new();
    let sender = mesh
        .connect(config.device_locator())
        .with_context(|| format!("Failed to open {}", config.device_locator()))?;
    let receiver_node = mesh.connect("loopback-rx")?;

    let store = Arc::new(ReassemblyStore::new());
    let (receiver, events) = VoiceReceiver::new(store.clone());
    receiver_node.subscribe(receiver.into_handler());
    let _reaper = Reaper::start(store, config.session_timeout(), config.reap_interval(), None)
        .context("Failed to start reaper")?;

    let transmitter = FragmentationTransmitter::new(sender.clone(), config.to_transmitter_config());
    let handle = transmitter.spawn(payload, chunk_size.budget())?;
    let cancel = handle.cancellation_token();
    info!("Sending {} from {} to {}", input.display(), sender.node_id(), receiver_node.node_id());

    let mut worker = tokio::task::spawn_blocking(move || handle.join());
    let report = tokio::select! {
        joined = &mut worker => joined??,
        _ = tokio::signal::ctrl_c() => {
            println!("Cancelling transfer...");
            cancel.cancel();
            worker.await??
        }
    };
    println!(
        "Send {:?}: {}/{} packets, {} retries",
        report.outcome(),
        report.sent.len(),
        report.total_chunks,
        report.retries
    );

    let archive = VoiceArchive::new(&config.reception.output_dir);
    for event in events.try_iter() {
        match event {
            ReceiverEvent::Voice(voice) => {
                let path = archive.save(&voice)?;
                println!(
                    "Received {:.2}s from {} -> {}",
                    voice.clip.duration().as_secs_f32(),
                    voice.origin,
                    path.display()
                );
            }
            ReceiverEvent::Progress { transfer_id, have, total, .. } => {
                info!("{}: {}/{}", transfer_id, have, total);
            }
            ReceiverEvent::Dropped { from, reason } => println!("Dropped message from {}: {}", from, reason),
            other => info!("{:?}", other),
        }
    }

    sender.disconnect();
    receiver_node.disconnect();
    Ok(())
}

fn show_config(manager: &ConfigManager) -> Result<()> {
    let text = toml::to_string_pretty(manager.get_config()).context("Failed to serialize configuration")?;
    println!("# {}", manager.path().display());
    println!("{}", text);
    Ok(())
}
