use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use basedrop::{Collector, Handle, Shared};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use pitchplay_transport::{AudioArc, PlaybackSink};

type SharedAudio = Shared<Option<AudioArc>>;

enum SinkCommand {
    Play { start_frame: usize },
    Pause,
    Stop,
}

/// Output sink over the default cpal device.
///
/// The control thread talks to the audio callback exclusively through
/// lock-free rings: one for transport commands, one for buffer swaps. Buffers
/// travel as basedrop `Shared` pointers so the callback never frees memory;
/// released buffers are reclaimed by the collector on the control thread.
pub struct CpalSink {
    commands: rtrb::Producer<SinkCommand>,
    buffers: rtrb::Producer<SharedAudio>,
    busy: Arc<AtomicBool>,
    collector: Collector,
    handle: Handle,
    device_rate: u32,
    _stream: cpal::Stream,
}

impl CpalSink {
    /// Open the default output device and start its stream.
    pub fn new() -> anyhow::Result<Self> {
        let collector = Collector::new();
        let handle = collector.handle();

        let (command_tx, command_rx) = rtrb::RingBuffer::<SinkCommand>::new(64);
        let (buffer_tx, buffer_rx) = rtrb::RingBuffer::<SharedAudio>::new(4);

        let initial: SharedAudio = Shared::new(&handle, None);
        let busy = Arc::new(AtomicBool::new(false));

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no output device found"))?;

        let config = device.default_output_config()?;
        let device_rate = config.sample_rate().0;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(
                &device,
                &config.into(),
                initial,
                command_rx,
                buffer_rx,
                Arc::clone(&busy),
            )?,
            sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
        };

        stream.play()?;

        Ok(Self {
            commands: command_tx,
            buffers: buffer_tx,
            busy,
            collector,
            handle,
            device_rate,
            _stream: stream,
        })
    }

    /// Output sample rate of the opened device.
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

impl PlaybackSink for CpalSink {
    fn set_buffer(&mut self, audio: Option<AudioArc>) -> anyhow::Result<()> {
        let audio = match audio {
            Some(audio) => Some(audio.resample(self.device_rate)?),
            None => None,
        };
        let shared = Shared::new(&self.handle, audio);
        if self.buffers.push(shared).is_err() {
            anyhow::bail!("audio thread buffer queue is full");
        }
        // Reclaim buffers the callback has released.
        self.collector.collect();
        Ok(())
    }

    fn play(&mut self, start_offset_ms: u64) -> anyhow::Result<()> {
        let start_frame = (start_offset_ms * self.device_rate as u64 / 1000) as usize;
        self.commands
            .push(SinkCommand::Play { start_frame })
            .map_err(|_| anyhow::anyhow!("audio thread command queue is full"))
    }

    fn pause(&mut self) {
        if self.commands.push(SinkCommand::Pause).is_err() {
            log::warn!("audio thread command queue is full, pause dropped");
        }
    }

    fn stop(&mut self) {
        if self.commands.push(SinkCommand::Stop).is_err() {
            log::warn!("audio thread command queue is full, stop dropped");
        }
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    initial: SharedAudio,
    mut command_rx: rtrb::Consumer<SinkCommand>,
    mut buffer_rx: rtrb::Consumer<SharedAudio>,
    busy: Arc<AtomicBool>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let output_channels = config.channels as usize;

    let mut current = initial;
    let mut playing = false;
    let mut frame_pos = 0usize;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            // Swap in a new buffer if available (lock-free); a swap always
            // drops the transport back to the idle cursor.
            while let Ok(next) = buffer_rx.pop() {
                current = next;
                playing = false;
                frame_pos = 0;
            }

            while let Ok(command) = command_rx.pop() {
                match command {
                    SinkCommand::Play { start_frame } => {
                        frame_pos = start_frame;
                        playing = true;
                    }
                    SinkCommand::Pause => playing = false,
                    SinkCommand::Stop => {
                        playing = false;
                        frame_pos = 0;
                    }
                }
            }

            let audio = (*current).as_ref();
            for frame in data.chunks_mut(output_channels) {
                let mut wrote = false;
                if playing {
                    if let Some(audio) = audio {
                        let file_channels = audio.channels() as usize;
                        if frame_pos < audio.frames() {
                            let samples = audio.samples();
                            for (ch, sample) in frame.iter_mut().enumerate() {
                                let idx = frame_pos * file_channels + ch % file_channels;
                                *sample = T::from_sample(samples[idx]);
                            }
                            frame_pos += 1;
                            wrote = true;
                        } else {
                            playing = false;
                        }
                    }
                }
                if !wrote {
                    for sample in frame.iter_mut() {
                        *sample = T::from_sample(0.0);
                    }
                }
            }

            busy.store(playing, Ordering::Relaxed);
        },
        |err| log::error!("output stream error: {err}"),
        None,
    )?;

    Ok(stream)
}
