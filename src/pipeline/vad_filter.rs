//! Pipeline component wrapping the voice activity manager.

use crate::config::VadConfig;
use crate::pipeline::component::{Enhancer, PipelineContext};
use crate::pipeline::error::ComponentError;
use crate::segment::EnhancedSegment;
use crate::vad::{ENGINE_NONE, VoiceActivityManager};
use std::collections::BTreeMap;

pub struct VadFilter {
    manager: VoiceActivityManager,
    counters: BTreeMap<String, f64>,
}

impl VadFilter {
    pub fn new(config: VadConfig) -> Self {
        Self::with_manager(VoiceActivityManager::new(config))
    }

    pub fn with_manager(manager: VoiceActivityManager) -> Self {
        Self {
            manager,
            counters: BTreeMap::new(),
        }
    }
}

impl Enhancer for VadFilter {
    fn name(&self) -> &'static str {
        "vad"
    }

    fn requires_audio(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        self.manager.is_available()
    }

    fn process(
        &mut self,
        segments: &[EnhancedSegment],
        ctx: &mut PipelineContext<'_>,
    ) -> Result<Vec<EnhancedSegment>, ComponentError> {
        let waveform = ctx.require_waveform(self.name())?;
        let outcome = self.manager.process_segments(segments.to_vec(), waveform);

        self.counters.clear();
        self.counters
            .insert("segments_removed".to_string(), outcome.removed as f64);
        self.counters
            .insert("speech_spans".to_string(), outcome.speech.len() as f64);
        self.counters.insert(
            "speech_ratio".to_string(),
            outcome.speech_ratio(waveform.duration()),
        );
        self.counters.insert(
            "engine_available".to_string(),
            if outcome.engine_used == ENGINE_NONE { 0.0 } else { 1.0 },
        );

        ctx.pause_hints = outcome.pause_hints;
        ctx.vad_engine = Some(outcome.engine_used);
        Ok(outcome.segments)
    }

    fn metrics(&self) -> BTreeMap<String, f64> {
        self.counters.clone()
    }
}
