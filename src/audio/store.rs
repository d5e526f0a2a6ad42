use crate::error::{DecodeError, Error, Result};

/// Immutable decoded PCM, one `Vec<f32>` per channel.
#[derive(Debug, Clone)]
pub struct SampleStore {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    duration_seconds: f64,
    /// Peak absolute amplitude of channel 0
    peak: f32,
}

impl SampleStore {
    /// Build a store from planar channel data.
    ///
    /// Channels shorter than the longest one are padded with silence so every
    /// channel has the same length.
    pub fn from_channels(
        mut channels: Vec<Vec<f32>>,
        sample_rate: u32,
    ) -> std::result::Result<Self, DecodeError> {
        if sample_rate == 0 {
            return Err(DecodeError::Corrupt("sample rate is zero".into()));
        }
        let len = channels.iter().map(Vec::len).max().unwrap_or(0);
        if len == 0 {
            return Err(DecodeError::Empty);
        }
        for ch in channels.iter_mut() {
            ch.resize(len, 0.0);
        }

        let peak = channels[0]
            .iter()
            .map(|s| s.abs())
            .filter(|s| s.is_finite())
            .fold(0.0f32, f32::max);

        Ok(Self {
            duration_seconds: len as f64 / sample_rate as f64,
            channels,
            sample_rate,
            peak,
        })
    }

    /// Bounds-checked sample accessor. Never clamps.
    pub fn sample_at(&self, channel: usize, index: usize) -> Result<f32> {
        self.channels
            .get(channel)
            .and_then(|ch| ch.get(index))
            .copied()
            .ok_or(Error::OutOfRange {
                channel,
                index,
                channels: self.channels.len(),
                len: self.len(),
            })
    }

    pub fn channel(&self, channel: usize) -> Result<&[f32]> {
        self.channels
            .get(channel)
            .map(Vec::as_slice)
            .ok_or(Error::OutOfRange {
                channel,
                index: 0,
                channels: self.channels.len(),
                len: self.len(),
            })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Interleave back to frames of `channel_count` samples.
    #[cfg(test)]
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len() * self.channel_count());
        for i in 0..self.len() {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_short_channels_and_reports_duration() {
        let store = SampleStore::from_channels(vec![vec![0.5; 4], vec![0.25; 3]], 4).unwrap();
        assert_eq!(store.channel_count(), 2);
        assert_eq!(store.len(), 4);
        assert_eq!(store.duration_seconds(), 1.0);
        assert_eq!(store.sample_at(1, 3).unwrap(), 0.0);
        assert_eq!(store.interleaved().len(), 8);
    }

    #[test]
    fn sample_at_rejects_out_of_range() {
        let store = SampleStore::from_channels(vec![vec![0.1, -0.9]], 8000).unwrap();
        assert_eq!(store.sample_at(0, 1).unwrap(), -0.9);
        assert!(matches!(
            store.sample_at(0, 2),
            Err(Error::OutOfRange { channel: 0, index: 2, .. })
        ));
        assert!(matches!(store.sample_at(1, 0), Err(Error::OutOfRange { channel: 1, .. })));
        assert!(store.channel(3).is_err());
    }

    #[test]
    fn empty_audio_is_a_decode_error() {
        assert!(matches!(
            SampleStore::from_channels(vec![Vec::new()], 44100),
            Err(DecodeError::Empty)
        ));
        assert!(matches!(
            SampleStore::from_channels(Vec::new(), 44100),
            Err(DecodeError::Empty)
        ));
        assert!(matches!(
            SampleStore::from_channels(vec![vec![0.0]], 0),
            Err(DecodeError::Corrupt(_))
        ));
    }

    #[test]
    fn peak_tracks_channel_zero() {
        let store =
            SampleStore::from_channels(vec![vec![0.2, -0.7, 0.1], vec![1.0, 1.0, 1.0]], 3).unwrap();
        assert_eq!(store.peak(), 0.7);
    }
}
