use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::store::SampleStore;
use crate::error::DecodeError;

/// Read an audio file and decode it, using the extension as a format hint.
pub fn load_file(path: &Path) -> Result<SampleStore, DecodeError> {
    let bytes = std::fs::read(path)?;
    load(bytes, path.extension().and_then(|e| e.to_str()))
}

/// Decode an in-memory audio asset into planar f32 channels.
pub fn load(bytes: Vec<u8>, extension_hint: Option<&str>) -> Result<SampleStore, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::Unsupported("no audio tracks found".into()))?;

    let track_id = track.id;
    let channel_count = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::Corrupt("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count];
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => {
                skipped_packets += 1;
                continue;
            }
            Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        let decoded_channels = spec.channels.count().max(1);

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        // De-interleave; channels missing from this packet stay silent
        for frame in sample_buf.samples().chunks(decoded_channels) {
            for (ch, out) in channels.iter_mut().enumerate() {
                out.push(frame.get(ch).copied().unwrap_or(0.0));
            }
        }
    }

    if skipped_packets > 0 {
        log::warn!("Skipped {} undecodable packets", skipped_packets);
    }

    let store = SampleStore::from_channels(channels, sample_rate)?;

    log::info!(
        "Decoded audio: {} samples x {} channels, {}Hz, {:.1}s",
        store.len(),
        store.channel_count(),
        store.sample_rate(),
        store.duration_seconds()
    );

    Ok(store)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encode interleaved float samples as a 16-bit PCM WAV in memory.
    pub(crate) fn wav_bytes(interleaved: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in interleaved {
                writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_mono_wav() {
        let samples: Vec<f32> = (0..4410).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let store = load(wav_bytes(&samples, 1, 44100), Some("wav")).unwrap();
        assert_eq!(store.channel_count(), 1);
        assert_eq!(store.sample_rate(), 44100);
        assert_eq!(store.len(), 4410);
        assert!((store.duration_seconds() - 0.1).abs() < 1e-9);
        assert!((store.sample_at(0, 100).unwrap() - samples[100]).abs() < 1e-3);
    }

    #[test]
    fn keeps_stereo_channels_separate() {
        let interleaved: Vec<f32> = (0..2000).flat_map(|_| [0.5f32, -0.25]).collect();
        let store = load(wav_bytes(&interleaved, 2, 8000), None).unwrap();
        assert_eq!(store.channel_count(), 2);
        assert_eq!(store.len(), 2000);
        assert!((store.sample_at(0, 10).unwrap() - 0.5).abs() < 1e-3);
        assert!((store.sample_at(1, 10).unwrap() + 0.25).abs() < 1e-3);
        assert_eq!(store.interleaved().len(), 4000);
    }

    #[test]
    fn garbage_bytes_are_unsupported() {
        let err = load(b"definitely not audio".to_vec(), None).unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported(_)));
    }

    #[test]
    fn zero_length_audio_is_rejected() {
        assert!(matches!(load(Vec::new(), None), Err(DecodeError::Empty)));
        let empty_wav = wav_bytes(&[], 1, 44100);
        assert!(load(empty_wav, Some("wav")).is_err());
    }
}
