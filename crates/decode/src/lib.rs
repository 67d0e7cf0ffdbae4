use std::fs::File;
use std::path::{Path, PathBuf};

use pitchplay_transport::AudioArc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Errors surfaced while turning a file on disk into a decoded session.
///
/// Surfaced once to the caller of `load_file`; the transport stays Stopped
/// with no session adopted.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unrecognized or corrupt container: {0}")]
    Probe(#[source] symphonia::core::errors::Error),
    #[error("no decodable audio track")]
    NoTrack,
    #[error("codec error: {0}")]
    Decode(#[source] symphonia::core::errors::Error),
    #[error("audio output rejected the decoded stream: {0}")]
    Output(String),
}

impl From<anyhow::Error> for LoadError {
    fn from(err: anyhow::Error) -> Self {
        LoadError::Output(err.to_string())
    }
}

/// Decode an audio file into an interleaved f32 buffer.
///
/// Decodes the container's default track packet-by-packet. An unexpected EOF
/// from the demuxer terminates the packet loop normally; everything decoded
/// up to that point is returned.
pub fn decode_file(path: &Path) -> Result<AudioArc, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(LoadError::Probe)?;

    let mut format = probed.format;

    let track = format.default_track().ok_or(LoadError::NoTrack)?;

    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(LoadError::Decode)?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(LoadError::Decode(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet).map_err(LoadError::Decode)?;
        let spec = *decoded.spec();
        let duration = decoded.capacity() as u64;

        let mut sample_buf = SampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    // Some streams report a channel count their final packet doesn't honor.
    samples.truncate(samples.len() - samples.len() % channels as usize);

    Ok(AudioArc::new(samples, sample_rate, channels))
}
