//! Song arrangement: an ordered list of (preset, repeats) blocks.
//!
//! The arrangement listens to the scheduler, counts completed progression
//! cycles and queues the next block's preset so the swap lands on the next
//! bar start.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::preset::Preset;
use crate::scheduler::{StepContext, StepEvent, StepListener};

/// Play `preset` for `repeats` passes through its progression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongBlock {
    pub preset: String,
    #[serde(default = "default_repeats")]
    pub repeats: u32,
}

fn default_repeats() -> u32 {
    1
}

impl SongBlock {
    pub fn new(preset: impl Into<String>, repeats: u32) -> Self {
        Self {
            preset: preset.into(),
            repeats,
        }
    }
}

/// Serializable block list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongLayout {
    #[serde(default)]
    pub blocks: Vec<SongBlock>,
    #[serde(default)]
    pub looping: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SongArrangement {
    layout: SongLayout,
    presets: BTreeMap<String, Preset>,
    active: bool,
    finished: bool,
    block_index: usize,
    cycles_in_block: u32,
}

impl SongArrangement {
    pub fn new(layout: SongLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn layout(&self) -> &SongLayout {
        &self.layout
    }

    pub fn blocks(&self) -> &[SongBlock] {
        &self.layout.blocks
    }

    pub fn push_block(&mut self, block: SongBlock) {
        self.layout.blocks.push(block);
    }

    pub fn remove_block(&mut self, index: usize) -> Option<SongBlock> {
        (index < self.layout.blocks.len()).then(|| self.layout.blocks.remove(index))
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.layout.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.layout.looping
    }

    /// Add or replace a preset in the arrangement's library.
    pub fn insert_preset(&mut self, preset: Preset) -> Option<Preset> {
        self.presets.insert(preset.name.clone(), preset)
    }

    pub fn remove_preset(&mut self, name: &str) -> Option<Preset> {
        self.presets.remove(name)
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    pub fn preset_names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The last block played through and looping is off.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Index of the block currently playing.
    pub fn current_block(&self) -> Option<usize> {
        self.active.then_some(self.block_index)
    }

    /// Rewind to the first playable block and return its preset, which the
    /// caller applies before starting the scheduler.
    pub fn start(&mut self) -> Option<Preset> {
        self.finished = false;
        self.cycles_in_block = 0;
        let Some(index) = self.playable_from(0, false) else {
            tracing::warn!("song has no playable blocks");
            self.active = false;
            return None;
        };
        self.active = true;
        self.block_index = index;
        tracing::info!(block = index, "song started");
        self.block_preset(index).cloned()
    }

    /// Stop following the arrangement. The scheduler keeps its config.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    fn block_preset(&self, index: usize) -> Option<&Preset> {
        self.layout
            .blocks
            .get(index)
            .and_then(|b| self.presets.get(&b.preset))
    }

    /// First block at or after `from` whose preset exists. Wraps to the
    /// start only when `wrap` is set.
    fn playable_from(&self, from: usize, wrap: bool) -> Option<usize> {
        let len = self.layout.blocks.len();
        let count = if wrap { len } else { len.saturating_sub(from) };
        for index in (0..count).map(|i| (from + i) % len) {
            if self.block_preset(index).is_some() {
                return Some(index);
            }
            tracing::warn!(
                block = index,
                preset = %self.layout.blocks[index].preset,
                "song block skipped, preset not found"
            );
        }
        None
    }

    fn advance(&mut self, ctx: &mut StepContext<'_>) {
        self.cycles_in_block = 0;
        match self.playable_from(self.block_index + 1, self.layout.looping) {
            Some(index) => {
                self.block_index = index;
                if let Some(preset) = self.block_preset(index).cloned() {
                    tracing::info!(block = index, preset = %preset.name, "song block queued");
                    ctx.queue_preset(preset);
                }
            }
            None => {
                tracing::info!("song finished");
                self.finished = true;
            }
        }
    }
}

impl StepListener for SongArrangement {
    fn on_step(&mut self, event: &StepEvent, ctx: &mut StepContext<'_>) {
        if !self.active || self.finished || !event.is_cycle_end() {
            return;
        }
        self.cycles_in_block += 1;
        let repeats = self
            .layout
            .blocks
            .get(self.block_index)
            .map_or(1, |b| b.repeats.max(1));
        if self.cycles_in_block >= repeats {
            self.advance(ctx);
        }
    }

    fn on_stop(&mut self, _engine: &mut crate::audio::AudioEngine) {
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioEngine;
    use crate::pattern::PatternBank;
    use crate::scheduler::{EventLog, Scheduler, SequencerConfig};
    use crate::theory::PitchClass;

    const SR: u32 = 8000;

    /// 240 BPM with a one-bar progression: one cycle per second.
    fn preset(name: &str, key: &str) -> Preset {
        let mut config = SequencerConfig {
            bpm: 240.0,
            key: PitchClass::parse(key).unwrap(),
            ..SequencerConfig::default()
        };
        config.patterns.progression = "One".to_string();
        Preset::named(name, config)
    }

    fn play(song: &mut SongArrangement, seconds: f64) -> Vec<String> {
        let mut engine = AudioEngine::new(SR, 30, 1);
        let mut patterns = PatternBank::builtin();
        patterns.progressions.insert_custom("One", vec![0]);
        let first = song.start().unwrap();
        let mut scheduler = Scheduler::new(first.sequencer, patterns);
        let mut log = EventLog::new();
        scheduler.start(0.0);
        let blocks = (seconds * SR as f64 / 200.0).round() as usize;
        for _ in 0..blocks {
            scheduler.tick(&mut engine, &mut [&mut *song, &mut log]);
            engine.render_mono(200);
        }
        log.chord_changes().map(|c| c.chord.name.clone()).collect()
    }

    fn song(blocks: Vec<SongBlock>, looping: bool) -> SongArrangement {
        let mut song = SongArrangement::new(SongLayout { blocks, looping });
        song.insert_preset(preset("Verse", "C"));
        song.insert_preset(preset("Chorus", "G"));
        song
    }

    #[test]
    fn blocks_play_in_order_then_finish() {
        let mut song = song(
            vec![SongBlock::new("Verse", 1), SongBlock::new("Chorus", 2)],
            false,
        );
        let chords = play(&mut song, 3.5);
        assert_eq!(chords, ["C", "G", "G", "G"]);
        assert!(song.is_finished());
    }

    #[test]
    fn looping_returns_to_first_block() {
        let mut song = song(
            vec![SongBlock::new("Verse", 1), SongBlock::new("Chorus", 1)],
            true,
        );
        let chords = play(&mut song, 3.5);
        assert_eq!(chords, ["C", "G", "C", "G"]);
        assert!(!song.is_finished());
    }

    #[test]
    fn missing_preset_is_skipped() {
        let mut song = song(
            vec![
                SongBlock::new("Verse", 1),
                SongBlock::new("Bridge", 1),
                SongBlock::new("Chorus", 1),
            ],
            false,
        );
        let chords = play(&mut song, 2.5);
        assert_eq!(chords, ["C", "G", "G"]);
        assert_eq!(song.current_block(), Some(2));
    }

    #[test]
    fn nothing_playable() {
        let mut song = SongArrangement::new(SongLayout {
            blocks: vec![SongBlock::new("Ghost", 1)],
            looping: true,
        });
        assert!(song.start().is_none());
        assert!(!song.is_active());
    }

    #[test]
    fn layout_json_defaults_repeats() {
        let layout: SongLayout =
            serde_json::from_str(r#"{"blocks": [{"preset": "Verse"}]}"#).unwrap();
        assert_eq!(layout.blocks, [SongBlock::new("Verse", 1)]);
        assert!(!layout.looping);
    }
}
