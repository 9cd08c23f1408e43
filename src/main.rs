// src/main.rs

use boucle::{Engine, EngineConfig, Operation, Readback, TriggerEvent};

/// ===============================
/// Test Signal
/// ===============================

/// A sine whose pitch rises over the loop, so transforms are audible.
fn sweep(sample_rate: f64, start: usize, frames: usize) -> Vec<f32> {
    (start..start + frames)
        .map(|n| {
            let t = n as f64 / sample_rate;
            let freq = 220.0 + 110.0 * t;
            (0.5 * (std::f64::consts::TAU * freq * t).sin()) as f32
        })
        .collect()
}

fn peak(block: &[f32]) -> f32 {
    block.iter().fold(0.0f32, |p, s| p.max(s.abs()))
}

fn print_readback(r: &Readback) {
    println!(
        "{:?}: head {}/{} (rec {}), {} queued, {} active, {} dropped",
        r.state, r.play_head, r.loop_length, r.record_head, r.queued_ops, r.active_ops, r.dropped_ops
    );
    if let Some(start) = r.next_start {
        println!("next operation at {}", start);
    }
}

/// ===============================
/// Main
/// ===============================

fn main() {
    let sample_rate = 48_000.0;
    let block_frames = 512;

    // --------------------------------
    // Engine
    // --------------------------------

    let config = EngineConfig::new()
        .with_sample_rate(sample_rate)
        .with_ring_capacity(4 * sample_rate as usize)
        .with_max_ops(16, 16);
    let loop_frames = config.frames_for_beats(2.0, 120.0);

    let mut engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("cannot create engine: {}", e);
            return;
        }
    };
    engine.set_loop_length(loop_frames);

    // --------------------------------
    // Scheduled operations
    // --------------------------------

    for text in [
        "jump 4800 4800 -2400",
        "repeat 19200 9600 1200",
        "speed-ramp 36000 9600 1.0 0.5",
        "abs-jump 40000 bogus",
    ] {
        match text.parse::<Operation>() {
            Ok(op) => match engine.schedule(op) {
                Ok(id) => println!("scheduled #{}: {}", id, op),
                Err(e) => println!("cannot schedule {}: {}", op, e),
            },
            Err(e) => println!("cannot parse '{}': {}", text, e),
        }
    }

    // --------------------------------
    // Run a few loops
    // --------------------------------

    println!("Starting engine sanity test…");

    let mut output = vec![0.0; block_frames];
    let total_blocks = 3 * loop_frames as usize / block_frames;

    for block in 0..total_blocks {
        let input = sweep(sample_rate, block * block_frames, block_frames);

        // Hold a reverse for a few blocks every quarter loop
        let events = match block % 24 {
            4 => vec![TriggerEvent::note_on(100)],
            8 => vec![TriggerEvent::note_off(0)],
            _ => Vec::new(),
        };

        engine.process(&input, &mut output, &events);

        if block % 8 == 0 {
            println!("--- Block {} ---", block);
            println!("peak in {:.3}, out {:.3}", peak(&input), peak(&output));
            print_readback(&engine.readback());
        }
    }

    if engine.is_idle() {
        println!("All operations finished.");
    }
    println!("Sanity test completed.");
}
