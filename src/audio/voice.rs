use serde::{Deserialize, Serialize};

use super::{RenderRequest, Waveform};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    /// Seconds
    pub attack_secs: f32,
    /// 0.0 -> 1.0
    pub sustain_level: f32,
    /// Seconds
    pub release_secs: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack_secs: 0.01,
            sustain_level: 0.2,
            release_secs: 0.1,
        }
    }
}

impl Envelope {
    /// Gain `t` seconds into a note lasting `duration` seconds: a linear
    /// attack to the sustain level, held, then a linear release that ends
    /// exactly at `duration`. Notes shorter than attack + release ramp
    /// straight down after the attack.
    pub fn gain(&self, t: f32, duration: f32) -> f32 {
        if t < 0.0 || t >= duration {
            return 0.0;
        }
        let level = self.sustain_level;
        let attack = self.attack_secs.min(duration);

        if t < attack {
            return level * t / attack;
        }
        let release_start = (duration - self.release_secs).max(attack);
        if t < release_start {
            return level;
        }
        let release_len = duration - release_start;
        if release_len <= 0.0 {
            return 0.0;
        }
        level * (1.0 - (t - release_start) / release_len)
    }
}

/// A sounding note inside the output callback.
#[derive(Debug, Clone)]
pub struct Voice {
    pub frequency: f32,
    pub waveform: Waveform,
    pub envelope: Envelope,
    pub start_frame: u64,
    pub duration_secs: f32,
    phase: f32,
}

impl Voice {
    pub fn new(request: &RenderRequest, start_frame: u64) -> Self {
        Self {
            frequency: request.frequency as f32,
            waveform: request.waveform,
            envelope: request.envelope,
            start_frame,
            duration_secs: request.duration.as_secs_f32(),
            phase: 0.0,
        }
    }

    pub fn is_finished(&self, frame: u64, sample_rate: f32) -> bool {
        frame >= self.start_frame
            && (frame - self.start_frame) as f32 / sample_rate >= self.duration_secs
    }

    /// Renders the voice at absolute `frame`; silent before its start.
    pub fn next_sample(&mut self, frame: u64, sample_rate: f32) -> f32 {
        if frame < self.start_frame {
            return 0.0;
        }
        let t = (frame - self.start_frame) as f32 / sample_rate;
        let sample = self.waveform.sample(self.phase) * self.envelope.gain(t, self.duration_secs);

        self.phase += self.frequency / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample
    }
}
