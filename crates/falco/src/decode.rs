//! Sound decoding into interleaved f32 PCM.
//!
//! WAV goes through hound and is always available. MP3 and FLAC go through
//! symphonia behind the `symphonia-decode` feature. A clip is decoded once
//! when its player opens; reopening after playback reuses the result.

use std::io::Cursor;

use anyhow::{anyhow, bail, Context, Result};

/// A whole clip in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved samples in `-1.0..=1.0`
    pub samples: Vec<f32>,
    /// Native sample rate
    pub sample_rate: u32,
    pub channels: u8,
}

impl DecodedAudio {
    /// Samples per channel.
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            n => self.samples.len() / n as usize,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        match self.sample_rate {
            0 => 0.0,
            rate => self.frames() as f64 / rate as f64,
        }
    }

    fn checked(self) -> Result<Self> {
        if self.frames() == 0 {
            bail!("clip has no audio frames");
        }
        Ok(self)
    }
}

/// Full-scale value for signed PCM of `bits` width.
fn int_full_scale(bits: u16) -> Result<f32> {
    match bits {
        1..=32 => Ok((1_u64 << (bits - 1)) as f32),
        _ => Err(anyhow!("unsupported PCM width: {} bits", bits)),
    }
}

/// Decode a RIFF/WAVE clip.
pub fn decode_wav(data: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(data)).context("not a readable WAV stream")?;
    let format = reader.spec();

    let channels = match u8::try_from(format.channels) {
        Ok(0) | Err(_) => bail!("WAV stream declares {} channels", format.channels),
        Ok(n) => n,
    };
    if format.sample_rate == 0 {
        bail!("WAV stream declares a 0Hz sample rate");
    }

    let samples = match format.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .context("truncated float WAV data")?,
        hound::SampleFormat::Int => {
            let scale = int_full_scale(format.bits_per_sample)?;
            let mut samples = Vec::with_capacity(reader.len() as usize);
            for sample in reader.into_samples::<i32>() {
                samples.push(sample.context("truncated PCM WAV data")? as f32 / scale);
            }
            samples
        }
    };

    DecodedAudio {
        samples,
        sample_rate: format.sample_rate,
        channels,
    }
    .checked()
}

/// Decode MP3 or FLAC with symphonia.
#[cfg(feature = "symphonia-decode")]
pub fn decode_audio_symphonia(data: &[u8]) -> Result<DecodedAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let mut hint = Hint::new();
    if data.starts_with(b"fLaC") {
        hint.with_extension("flac");
    } else if data.starts_with(b"ID3") || data.starts_with(&[0xFF, 0xFB]) {
        hint.with_extension("mp3");
    }

    let source = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());
    let mut container = symphonia::default::get_probe()
        .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
        .context("Stream of unsupported format")?
        .format;

    let track = container
        .default_track()
        .ok_or_else(|| anyhow!("stream has no audio track"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("stream does not declare a sample rate"))?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("no decoder for this codec")?;

    let mut channels = track.codec_params.channels.map(|c| c.count() as u8);
    let mut samples = Vec::new();
    let mut scratch: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match container.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("failed to read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let block = match decoder.decode(&packet) {
            Ok(block) => block,
            // Corrupt frames are skipped, not fatal.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e).context("failed to decode packet"),
        };

        let layout = *block.spec();
        if channels.is_none() {
            channels = Some(layout.channels.count() as u8);
        }
        let needed = block.capacity() as u64;
        if scratch.as_ref().map_or(true, |b| (b.capacity() as u64) < needed) {
            scratch = Some(SampleBuffer::new(needed, layout));
        }
        let Some(buffer) = scratch.as_mut() else {
            continue;
        };
        buffer.copy_interleaved_ref(block);
        samples.extend_from_slice(buffer.samples());
    }

    DecodedAudio {
        samples,
        sample_rate,
        channels: channels.unwrap_or(2),
    }
    .checked()
}

/// Decode any supported clip, sniffing the container from its first bytes.
pub fn decode_audio(data: &[u8]) -> Result<DecodedAudio> {
    if data.starts_with(b"RIFF") {
        return decode_wav(data);
    }

    #[cfg(feature = "symphonia-decode")]
    {
        return decode_audio_symphonia(data);
    }

    #[cfg(not(feature = "symphonia-decode"))]
    {
        Err(anyhow!("Stream of unsupported format"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn wav_bytes<S: hound::Sample + Copy>(spec: hound::WavSpec, samples: &[S]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut out, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        out.into_inner()
    }

    /// Mono 16-bit sawtooth clip, `frames` long.
    pub(crate) fn generate_test_wav(frames: usize, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let samples: Vec<i16> = (0..frames).map(|i| (i % 128) as i16 * 64).collect();
        wav_bytes(spec, &samples)
    }

    #[test]
    fn pcm16_is_normalized() {
        let clip = decode_wav(&generate_test_wav(4800, 48000)).unwrap();

        assert_eq!((clip.channels, clip.sample_rate, clip.frames()), (1, 48000, 4800));
        assert!((clip.duration_seconds() - 0.1).abs() < 1e-9);
        assert!(clip.samples.iter().all(|s| (-1.0..1.0).contains(s)));
    }

    #[test]
    fn stereo_float_keeps_interleaving() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let clip = decode_wav(&wav_bytes(spec, &[0.5f32, -0.5, 0.25, -0.25])).unwrap();

        assert_eq!(clip.frames(), 2);
        assert_eq!(clip.samples, vec![0.5, -0.5, 0.25, -0.25]);
    }

    #[test]
    fn empty_clip_is_rejected() {
        assert!(decode_wav(&generate_test_wav(0, 48000)).is_err());
    }

    #[test]
    fn unknown_container_is_unsupported() {
        assert!(decode_audio(b"this is not audio at all").is_err());
        assert!(decode_audio(b"RIFF\x00\x00").is_err());
    }
}
