use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use tracing::{error, info, warn};

use super::{RenderRequest, ToneSink, Voice};
use crate::error::{Error, Result};

#[derive(Debug)]
enum SinkMessage {
    Play { request: RenderRequest, start_frame: u64 },
    SilenceAll,
}

/// Keeps the output stream alive. `cpal` streams are not `Send` on every
/// platform, so this half stays on the thread that opened it while the
/// [`CpalSink`] half can move to the engine.
pub struct AudioOutput {
    _stream: cpal::Stream,
}

pub struct CpalSink {
    producer: HeapProd<SinkMessage>,
    frame_counter: Arc<AtomicU64>,
    sample_rate: f32,
}

struct CallbackState {
    consumer: HeapCons<SinkMessage>,
    voices: Vec<Voice>,
    sample_rate: f32,
    num_channels: usize,
}

impl AudioOutput {
    pub fn open(queue_capacity: usize) -> Result<(AudioOutput, CpalSink)> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(Error::NoOutputDevice)?;
        let config = device.default_output_config()?;
        let stream_config: cpal::StreamConfig = config.into();

        let sample_rate = stream_config.sample_rate.0 as f32;
        let num_channels = stream_config.channels as usize;
        info!(num_channels, sample_rate, "audio output opened");

        let ring_buffer = HeapRb::<SinkMessage>::new(queue_capacity);
        let (producer, consumer) = ring_buffer.split();
        let frame_counter = Arc::new(AtomicU64::new(0));

        let mut state = CallbackState {
            consumer,
            voices: Vec::with_capacity(64),
            sample_rate,
            num_channels,
        };
        let counter = frame_counter.clone();

        let stream = device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                audio_callback(data, &mut state, &counter);
            },
            |err| error!("audio stream error: {err}"),
            None,
        )?;
        stream.play()?;

        let sink = CpalSink {
            producer,
            frame_counter,
            sample_rate,
        };
        Ok((AudioOutput { _stream: stream }, sink))
    }
}

impl CpalSink {
    fn push(&mut self, message: SinkMessage) {
        if self.producer.try_push(message).is_err() {
            warn!("audio queue is full, dropping message");
        }
    }
}

impl ToneSink for CpalSink {
    fn render(&mut self, request: RenderRequest) {
        if request.frequency <= 0.0 {
            return;
        }
        let now = self.frame_counter.load(Ordering::Relaxed);
        let offset = (request.start_offset.as_secs_f32() * self.sample_rate) as u64;
        self.push(SinkMessage::Play {
            request,
            start_frame: now + offset,
        });
    }

    fn silence_all(&mut self) {
        self.push(SinkMessage::SilenceAll);
    }
}

fn audio_callback(data: &mut [f32], state: &mut CallbackState, frame_counter: &AtomicU64) {
    while let Some(message) = state.consumer.try_pop() {
        match message {
            SinkMessage::Play {
                request,
                start_frame,
            } => state.voices.push(Voice::new(&request, start_frame)),
            SinkMessage::SilenceAll => state.voices.clear(),
        }
    }

    let channels = state.num_channels.max(1);
    let num_frames = data.len() / channels;
    let first_frame = frame_counter.load(Ordering::Relaxed);
    let sample_rate = state.sample_rate;

    for (i, frame) in data.chunks_mut(channels).enumerate() {
        let position = first_frame + i as u64;
        let sample: f32 = state
            .voices
            .iter_mut()
            .map(|v| v.next_sample(position, sample_rate))
            .sum();
        frame.fill(sample.clamp(-1.0, 1.0));
    }

    let end_frame = first_frame + num_frames as u64;
    state.voices.retain(|v| !v.is_finished(end_frame, sample_rate));

    frame_counter.fetch_add(num_frames as u64, Ordering::Relaxed);
}
