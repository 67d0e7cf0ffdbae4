use std::path::Path;
use std::time::Duration;

use pitchplay_core::{CpalSink, Player, PlayerEvent};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: play <audio-file>"))?;

    let sink = CpalSink::new()?;
    let mut player = Player::new(Box::new(sink));
    player.load_file(Path::new(&path))?;
    println!("loaded {} ({} ms)", path, player.duration_ms());

    player.play();
    loop {
        std::thread::sleep(Duration::from_millis(100));
        for event in player.poll() {
            match event {
                PlayerEvent::Pitch(sample) => match sample.frequency_hz {
                    Some(hz) => println!("{:>8} ms  {:>6.1} Hz", sample.timestamp_ms, hz),
                    None => println!("{:>8} ms      --", sample.timestamp_ms),
                },
                PlayerEvent::PlaybackEnded { .. } => {
                    println!("playback ended");
                    return Ok(());
                }
                PlayerEvent::VisualizationCleared => {}
            }
        }
    }
}
