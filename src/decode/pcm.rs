/// Average each interleaved frame of `channels` samples into one sample.
///
/// Mono (or an unknown channel count) passes through. A trailing partial
/// frame is dropped.
pub fn downmix_to(interleaved: &[i16], channels: u16, out: &mut Vec<i16>) {
    out.clear();
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let ch = usize::from(channels);
    out.extend(interleaved.chunks_exact(ch).map(|frame| {
        let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
        (sum / ch as i32) as i16
    }));
}

/// In-place variant; returns the number of mono samples now at the front of `pcm`.
pub fn downmix_in_place(pcm: &mut [i16], channels: u16) -> usize {
    if channels <= 1 {
        return pcm.len();
    }
    let ch = usize::from(channels);
    let frames = pcm.len() / ch;
    for i in 0..frames {
        let sum: i32 = pcm[i * ch..(i + 1) * ch].iter().map(|&s| i32::from(s)).sum();
        pcm[i] = (sum / ch as i32) as i16;
    }
    frames
}

/// Playback time of `samples_per_channel` samples, truncated to whole milliseconds.
pub fn frame_duration_ms(samples_per_channel: usize, sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        return 0;
    }
    (samples_per_channel as u64 * 1000 / u64::from(sample_rate)) as u32
}
