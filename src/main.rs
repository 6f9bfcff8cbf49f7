// Headless renderer: builds a small song with the built-in generators,
// generates it through the playback path and writes a MIDI file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use accompanist_lib::config::{default_config_path, Config};
use accompanist_lib::export;
use accompanist_lib::model::{
    ChordSymbol, Composition, FillAtEnd, SharedComposition, VoiceBinding, VoiceId, VoiceKind,
};
use accompanist_lib::{ActiveContextTracker, GeneratorRegistry};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let verbose = args.iter().any(|a| a == "--verbose");
    let save_config = args.iter().any(|a| a == "--save-config");
    let arg_value = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    let config_path = arg_value("--config").map(PathBuf::from).unwrap_or_else(default_config_path);
    let out_path = arg_value("--out").map(PathBuf::from);
    let chords = arg_value("--chords").unwrap_or_else(|| "C Am F G".to_string());

    let log_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(e) = run(&config_path, save_config, out_path, &chords) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(config_path: &Path, save_config: bool, out_path: Option<PathBuf>, chords: &str) -> anyhow::Result<()> {
    let config = Config::load_or_default(config_path);
    if save_config {
        config.save(config_path)?;
        log::info!("Saved config to {}", config_path.display());
    }

    let registry = Arc::new(GeneratorRegistry::with_builtins());
    let tracker = ActiveContextTracker::new(&config, registry)?;

    let composition = demo_composition(chords)?;
    tracker.bind(composition);

    let result = tracker.generate_now_for_playback()?;
    for (voice, phrase) in &result.phrases {
        log::info!("{}: {} notes on channel {}", voice, phrase.len(), phrase.channel());
    }
    for error in result.errors.values().flatten() {
        log::warn!("{}", error);
    }

    let out_path = out_path.unwrap_or_else(|| config.output_dir.join("accompaniment.mid"));
    export::write_midi(&result, &out_path, config.export_ticks_per_beat, config.export_tempo_bpm)
}

/// Eight-bar song: a "pop" verse and a "ballad" outro that fades out.
/// Chords cycle one per bar.
fn demo_composition(chords: &str) -> anyhow::Result<Arc<SharedComposition>> {
    let symbols = chords
        .split_whitespace()
        .map(|s| s.parse::<ChordSymbol>())
        .collect::<Result<Vec<_>, _>>()?;
    if symbols.is_empty() {
        anyhow::bail!("No chords given");
    }

    let mut composition = Composition::new("Demo");
    composition.timeline.add_segment("Verse", 4, "pop".into(), 4)?;
    let outro = composition.timeline.add_segment("Outro", 4, "ballad".into(), 4)?;
    composition.timeline.segment_mut(outro)?.params.fill_at_end = FillAtEnd::FadeOut;

    for bar in 0..composition.timeline.bar_count() {
        let symbol = symbols[bar as usize % symbols.len()];
        composition.timeline.set_chord(bar, 0.0, symbol)?;
    }

    composition.mix.bind(VoiceId::new("Piano"), VoiceBinding::new(0, VoiceKind::Chords));
    composition.mix.bind(VoiceId::new("Bass"), VoiceBinding::new(1, VoiceKind::Bass).with_transpose(-12));
    composition.mix.bind(VoiceId::new("Drums"), VoiceBinding::new(9, VoiceKind::Drums));

    Ok(SharedComposition::new(composition))
}
