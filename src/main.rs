use drumgrid::sequencer::{DEFAULT_BPM, NUM_TRACKS};
use drumgrid::{
    AudioBackend, CpalBackend, ExportOptions, MidiExporter, NullBackend, Pattern, Sequencer,
    StepTrigger, SystemClock, VoicePool,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

// Host frame period, roughly 60 updates per second
const FRAME: Duration = Duration::from_millis(16);

// Bars of the demo beat to play before exporting
const DEMO_BARS: f64 = 4.0;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== drumgrid ===");
    println!("usage: drumgrid [kit_dir] [bpm]\n");

    let mut args = std::env::args().skip(1);
    let kit_dir = args.next().map(PathBuf::from);
    let bpm = args
        .next()
        .and_then(|arg| arg.parse::<u32>().ok())
        .unwrap_or(DEFAULT_BPM);

    let backend: Box<dyn AudioBackend> = match CpalBackend::new() {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            log::warn!("{}; continuing without sound", e);
            Box::new(NullBackend::new())
        }
    };

    let mut pool = VoicePool::new(backend);
    if let Some(dir) = kit_dir {
        pool = pool.with_kit_dir(dir);
    }
    if let Err(e) = pool.init() {
        log::warn!("Voice pool not ready: {}", e);
    }

    let mut sequencer = Sequencer::new(SystemClock::new(), Some(pool));
    load_demo_beat(sequencer.pattern_mut());
    sequencer.set_bpm(bpm);

    let run_for = sequencer.step_duration() * 16.0 * DEMO_BARS;
    print_step(&sequencer.play());

    let start = Instant::now();
    let mut last = start;
    while start.elapsed().as_secs_f64() < run_for {
        std::thread::sleep(FRAME);
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;

        for trigger in sequencer.update(dt) {
            print_step(&trigger);
        }
        if let Some(pool) = sequencer.audio_mut() {
            pool.update(dt as f32);
        }
    }

    let info = sequencer.timing_info();
    sequencer.stop();
    println!(
        "\n{} steps in {:.3}s ({} skipped)",
        info.total_steps, info.elapsed_time, info.skipped_steps
    );

    // Let the last hits ring out
    std::thread::sleep(Duration::from_millis(500));

    let mut exporter = MidiExporter::new();
    let options = ExportOptions {
        bpm: Some(sequencer.bpm()),
        ..Default::default()
    };
    match exporter.export_with_options(sequencer.pattern(), &options) {
        Ok(path) => println!("Pattern exported to {}", path.display()),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_demo_beat(pattern: &mut Pattern) {
    for step in [1, 5, 9, 13] {
        pattern.set(1, step, true);
    }
    for step in [5, 13] {
        pattern.set(2, step, true);
    }
    for step in (1..=15).step_by(2) {
        pattern.set(3, step, true);
    }
    pattern.set(4, 15, true);
    pattern.set(5, 1, true);
}

fn print_step(trigger: &StepTrigger) {
    let lane: String = (1..=NUM_TRACKS)
        .map(|track| if trigger.tracks.contains(&track) { 'x' } else { '.' })
        .collect();
    println!("{:>2} {}", trigger.step, lane);
}
