use anyhow::{Result, anyhow};
use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::board::EffectChain;
use crate::board::chain::{DEFAULT_MAX_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};
use crate::dsp::AudioBuffer;
use crate::dsp::common::db_to_lin;
use crate::effects::{BYPASSED_KEY, ParameterSnapshot};

const MESSAGE_CAPACITY: usize = 64;
const RETIRED_CAPACITY: usize = 8;

pub const MIN_GAIN_DB: f32 = -24.0;
pub const MAX_GAIN_DB: f32 = 24.0;

pub enum EngineMessage {
    /// Replace the running chain. The id ties it to a set of live parameters.
    SetChain { chain: Box<EffectChain>, id: u64 },
    SetInputGain(f32),
    SetOutputGain(f32),
    SetGlobalBypass(bool),
    SetEffectBypass { index: usize, bypassed: bool },
    Reset,
}

/// Format the engine is currently prepared for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: f32,
    pub max_block_size: usize,
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

/// Host-owned parameter values, one snapshot per chain position.
#[derive(Debug, Clone, Default)]
pub struct LiveParameters {
    pub chain_id: u64,
    pub snapshots: Vec<ParameterSnapshot>,
}

/// Audio-side wrapper around the effect chain: gain staging, global bypass and
/// lock-free chain replacement.
pub struct Engine {
    chain: Box<EffectChain>,
    chain_id: u64,
    rx_updates: Receiver<EngineMessage>,
    tx_retired: Sender<Box<EffectChain>>,
    format: Arc<ArcSwap<StreamFormat>>,
    parameters: Arc<ArcSwap<LiveParameters>>,
    input_gain: f32,
    output_gain: f32,
    global_bypass: bool,
}

/// Control-side endpoint for an [`Engine`]. Everything here may allocate.
pub struct EngineHandle {
    tx_updates: Sender<EngineMessage>,
    rx_retired: Receiver<Box<EffectChain>>,
    format: Arc<ArcSwap<StreamFormat>>,
    parameters: Arc<ArcSwap<LiveParameters>>,
    next_chain_id: AtomicU64,
}

impl Engine {
    pub fn new(sample_rate: f32, max_block_size: usize) -> (Self, EngineHandle) {
        let (tx_updates, rx_updates) = bounded(MESSAGE_CAPACITY);
        let (tx_retired, rx_retired) = bounded(RETIRED_CAPACITY);
        let format = Arc::new(ArcSwap::from_pointee(StreamFormat {
            sample_rate,
            max_block_size,
        }));
        let parameters = Arc::new(ArcSwap::from_pointee(LiveParameters::default()));

        let mut chain = Box::new(EffectChain::new());
        chain.prepare(sample_rate, max_block_size);

        let engine = Self {
            chain,
            chain_id: 0,
            rx_updates,
            tx_retired,
            format: Arc::clone(&format),
            parameters: Arc::clone(&parameters),
            input_gain: 1.0,
            output_gain: 1.0,
            global_bypass: false,
        };
        let handle = EngineHandle {
            tx_updates,
            rx_retired,
            format,
            parameters,
            next_chain_id: AtomicU64::new(1),
        };

        (engine, handle)
    }

    /// Re-prepare for a new stream format. Not real-time safe.
    ///
    /// Pending messages are applied first, so a chain queued for the old format is
    /// installed here and prepared again with the new one.
    pub fn prepare(&mut self, sample_rate: f32, max_block_size: usize) {
        debug!("Engine format: {sample_rate} Hz, {max_block_size} frames");
        self.handle_messages();
        self.format.store(Arc::new(StreamFormat {
            sample_rate,
            max_block_size,
        }));
        self.chain.prepare(sample_rate, max_block_size);
    }

    pub fn reset(&mut self) {
        self.chain.reset();
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    pub const fn is_bypassed(&self) -> bool {
        self.global_bypass
    }

    /// Process one block in place.
    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        self.handle_messages();

        let parameters = self.parameters.load();
        if parameters.chain_id == self.chain_id {
            self.chain.apply_parameters(&parameters.snapshots);
        }

        if self.global_bypass {
            return;
        }

        if self.input_gain != 1.0 {
            buffer.apply_gain(self.input_gain);
        }
        self.chain.process_block(buffer);
        if self.output_gain != 1.0 {
            buffer.apply_gain(self.output_gain);
        }
    }

    pub fn handle_messages(&mut self) {
        while let Ok(message) = self.rx_updates.try_recv() {
            match message {
                EngineMessage::SetChain { mut chain, id } => {
                    let format = **self.format.load();
                    if chain.sample_rate() != format.sample_rate
                        || chain.max_block_size() != format.max_block_size
                    {
                        // Only reachable when the format changed while the chain was queued.
                        warn!("Chain {id} was prepared for another format, preparing it again");
                        chain.prepare(format.sample_rate, format.max_block_size);
                    }
                    let old = std::mem::replace(&mut self.chain, chain);
                    self.chain_id = id;
                    debug!("Received new effect chain {id}");
                    if self.tx_retired.try_send(old).is_err() {
                        warn!("Retired chain queue unavailable, dropping on the audio thread");
                    }
                }
                EngineMessage::SetInputGain(db) => self.input_gain = db_to_lin(db),
                EngineMessage::SetOutputGain(db) => self.output_gain = db_to_lin(db),
                EngineMessage::SetGlobalBypass(bypassed) => self.global_bypass = bypassed,
                EngineMessage::SetEffectBypass { index, bypassed } => {
                    match self.chain.effect_mut(index) {
                        Some(effect) => effect.set_bypassed(bypassed),
                        None => warn!("No effect at position {index} to bypass"),
                    }
                }
                EngineMessage::Reset => self.chain.reset(),
            }
        }
    }
}

impl EngineHandle {
    fn send(&self, message: EngineMessage) -> Result<()> {
        self.tx_updates.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => anyhow!("engine message queue is full"),
            TrySendError::Disconnected(_) => anyhow!("engine is no longer running"),
        })
    }

    pub fn format(&self) -> StreamFormat {
        **self.format.load()
    }

    /// Prepare `chain` for the engine's format and hand it over. The chain's own
    /// state becomes the live parameter set.
    pub fn set_chain(&self, mut chain: EffectChain) -> Result<()> {
        self.collect_retired();

        let format = self.format();
        chain.prepare(format.sample_rate, format.max_block_size);

        let id = self.next_chain_id.fetch_add(1, Ordering::Relaxed);
        let snapshots = chain
            .get_state()
            .effects
            .into_iter()
            .map(|e| e.parameters)
            .collect();

        // A chain the engine never receives must not take over the live parameters.
        self.send(EngineMessage::SetChain {
            chain: Box::new(chain),
            id,
        })?;
        self.parameters.store(Arc::new(LiveParameters {
            chain_id: id,
            snapshots,
        }));
        Ok(())
    }

    /// Replace the live value of one parameter of the effect at `index`.
    pub fn set_parameter(&self, index: usize, name: &str, value: f32) -> Result<()> {
        let current = self.parameters.load();
        let mut updated = LiveParameters::clone(&current);
        let snapshot = updated
            .snapshots
            .get_mut(index)
            .ok_or_else(|| anyhow!("no effect at position {index}"))?;
        snapshot.set_float(name, value);
        self.parameters.store(Arc::new(updated));
        Ok(())
    }

    pub fn live_parameters(&self) -> Arc<LiveParameters> {
        self.parameters.load_full()
    }

    pub fn set_input_gain(&self, db: f32) -> Result<()> {
        self.send(EngineMessage::SetInputGain(db.clamp(MIN_GAIN_DB, MAX_GAIN_DB)))
    }

    pub fn set_output_gain(&self, db: f32) -> Result<()> {
        self.send(EngineMessage::SetOutputGain(db.clamp(MIN_GAIN_DB, MAX_GAIN_DB)))
    }

    pub fn set_global_bypass(&self, bypassed: bool) -> Result<()> {
        self.send(EngineMessage::SetGlobalBypass(bypassed))
    }

    pub fn set_effect_bypass(&self, index: usize, bypassed: bool) -> Result<()> {
        self.send(EngineMessage::SetEffectBypass { index, bypassed })?;
        // Keep the live value in step so the next parameter pull does not undo it.
        let current = self.parameters.load();
        if current.snapshots.get(index).is_some() {
            let mut updated = LiveParameters::clone(&current);
            updated.snapshots[index].set_bool(BYPASSED_KEY, bypassed);
            self.parameters.store(Arc::new(updated));
        }
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        self.send(EngineMessage::Reset)
    }

    /// Drop chains the engine has retired. Returns how many were freed.
    pub fn collect_retired(&self) -> usize {
        self.rx_retired.try_iter().count()
    }
}
