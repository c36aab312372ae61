use dasp_sample::{FromSample, ToSample};

/// A sample format an audio device can hand us.
///
/// The relay itself works in 16-bit PCM; this trait converts device samples
/// to and from that representation.
pub trait AudioSample:
    cpal::SizedSample + ToSample<i16> + FromSample<i16> + Send + 'static
{
    fn silence() -> Self {
        Self::from_pcm(0)
    }

    fn to_pcm(self) -> i16 {
        <Self as ToSample<i16>>::to_sample_(self)
    }

    fn from_pcm(value: i16) -> Self {
        <Self as FromSample<i16>>::from_sample_(value)
    }
}

impl AudioSample for i16 {}

impl AudioSample for u16 {}

impl AudioSample for f32 {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i16_is_identity() {
        for v in [i16::MIN, -1, 0, 1, i16::MAX] {
            assert_eq!(v.to_pcm(), v);
            assert_eq!(i16::from_pcm(v), v);
        }
    }

    #[test]
    fn test_u16_silence_is_midpoint() {
        assert_eq!(u16::silence(), 32768);
        assert_eq!(u16::from_pcm(i16::MIN), 0);
        assert_eq!(32768u16.to_pcm(), 0);
    }

    #[test]
    fn test_f32_round_trip_extremes() {
        assert_eq!(f32::silence(), 0.0);
        assert_eq!(f32::from_pcm(i16::MIN), -1.0);
        assert_eq!((-1.0f32).to_pcm(), i16::MIN);
        assert_eq!(0.5f32.to_pcm(), 16384);
    }
}
