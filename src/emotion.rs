//! Continuous valence/arousal/dominance affect for a single agent.
//!
//! `current` chases `target` each tick while `target` relaxes back toward the
//! personality baseline. Stimuli move `target`, never `current`, so mood
//! changes are always smoothed over a few ticks.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::EmotionConfig;
use crate::types::Position;

/// Largest distance between two points of the VAD cube
const MAX_VAD_DISTANCE: f32 = 3.46;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionAxis {
    pub valence: f32,
    pub arousal: f32,
    pub dominance: f32,
}

impl EmotionAxis {
    pub fn new(valence: f32, arousal: f32, dominance: f32) -> Self {
        Self {
            valence,
            arousal,
            dominance,
        }
        .clamped()
    }

    pub fn lerp(&self, other: &EmotionAxis, alpha: f32) -> EmotionAxis {
        EmotionAxis {
            valence: lerp(self.valence, other.valence, alpha),
            arousal: lerp(self.arousal, other.arousal, alpha),
            dominance: lerp(self.dominance, other.dominance, alpha),
        }
    }

    pub fn distance(&self, other: &EmotionAxis) -> f32 {
        let dv = self.valence - other.valence;
        let da = self.arousal - other.arousal;
        let dd = self.dominance - other.dominance;
        (dv * dv + da * da + dd * dd).sqrt()
    }

    pub fn clamped(self) -> EmotionAxis {
        EmotionAxis {
            valence: self.valence.clamp(-1.0, 1.0),
            arousal: self.arousal.clamp(-1.0, 1.0),
            dominance: self.dominance.clamp(-1.0, 1.0),
        }
    }
}

fn lerp(a: f32, b: f32, alpha: f32) -> f32 {
    a + (b - a) * alpha
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoreEmotion {
    Joy,
    Trust,
    Fear,
    Surprise,
    Sadness,
    Disgust,
    Anger,
    Anticipation,
    Neutral,
}

impl CoreEmotion {
    /// Search order for the dominant emotion; the first of equally near wins
    pub const ALL: [CoreEmotion; 9] = [
        CoreEmotion::Joy,
        CoreEmotion::Trust,
        CoreEmotion::Fear,
        CoreEmotion::Surprise,
        CoreEmotion::Sadness,
        CoreEmotion::Disgust,
        CoreEmotion::Anger,
        CoreEmotion::Anticipation,
        CoreEmotion::Neutral,
    ];

    pub fn coordinates(&self) -> EmotionAxis {
        let (v, a, d) = match self {
            CoreEmotion::Joy => (0.9, 0.5, 0.6),
            CoreEmotion::Trust => (0.6, -0.2, 0.3),
            CoreEmotion::Fear => (-0.8, 0.7, -0.8),
            CoreEmotion::Surprise => (0.1, 0.8, -0.2),
            CoreEmotion::Sadness => (-0.7, -0.5, -0.5),
            CoreEmotion::Disgust => (-0.6, 0.2, 0.4),
            CoreEmotion::Anger => (-0.8, 0.8, 0.7),
            CoreEmotion::Anticipation => (0.3, 0.6, 0.3),
            CoreEmotion::Neutral => (0.0, 0.0, 0.0),
        };
        EmotionAxis::new(v, a, d)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CoreEmotion::Joy => "Joy",
            CoreEmotion::Trust => "Trust",
            CoreEmotion::Fear => "Fear",
            CoreEmotion::Surprise => "Surprise",
            CoreEmotion::Sadness => "Sadness",
            CoreEmotion::Disgust => "Disgust",
            CoreEmotion::Anger => "Anger",
            CoreEmotion::Anticipation => "Anticipation",
            CoreEmotion::Neutral => "Neutral",
        }
    }

    /// Resolve an emotion name or common synonym; unknown names are Neutral
    pub fn from_name(name: &str) -> CoreEmotion {
        match name.trim().to_lowercase().as_str() {
            "joy" | "happy" | "happiness" => CoreEmotion::Joy,
            "trust" | "calm" => CoreEmotion::Trust,
            "fear" | "scared" | "afraid" => CoreEmotion::Fear,
            "surprise" | "surprised" | "shock" => CoreEmotion::Surprise,
            "sadness" | "sad" | "sorrow" => CoreEmotion::Sadness,
            "disgust" | "disgusted" => CoreEmotion::Disgust,
            "anger" | "angry" | "rage" => CoreEmotion::Anger,
            "anticipation" | "excited" | "eager" => CoreEmotion::Anticipation,
            _ => CoreEmotion::Neutral,
        }
    }

    pub fn nearest(axis: &EmotionAxis) -> CoreEmotion {
        let mut closest = CoreEmotion::Neutral;
        let mut min_distance = f32::MAX;
        for emotion in CoreEmotion::ALL {
            let distance = axis.distance(&emotion.coordinates());
            if distance < min_distance {
                min_distance = distance;
                closest = emotion;
            }
        }
        closest
    }
}

impl fmt::Display for CoreEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seven facial weights derived from the current affect
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FacialExpression {
    pub joy: f32,
    pub sadness: f32,
    pub anger: f32,
    pub fear: f32,
    pub surprise: f32,
    pub disgust: f32,
    pub trust: f32,
    pub intensity: f32,
}

impl FacialExpression {
    pub fn from_axis(axis: &EmotionAxis, intensity: f32) -> Self {
        let v = axis.valence;
        let a = axis.arousal;
        let d = axis.dominance;
        let pos_v = v.max(0.0);
        let neg_v = (-v).max(0.0);

        let mut expression = FacialExpression {
            joy: pos_v * (0.5 + 0.5 * (a + 0.5).clamp(0.0, 1.0)),
            sadness: neg_v * (-a * 0.5 + 0.5).max(0.0),
            anger: neg_v * a.max(0.0) * (d * 0.5 + 0.5).max(0.0),
            fear: neg_v * a.max(0.0) * (-d * 0.5 + 0.5).max(0.0),
            surprise: (a - 0.3).max(0.0) * (1.0 - v.abs() * 0.5),
            disgust: (-v * 0.7).max(0.0) * (d * 0.5 + 0.5).max(0.0),
            trust: pos_v * (-a * 0.5 + 0.5).max(0.0),
            intensity,
        };

        let total = expression.total();
        if total > 1.5 {
            let scale = 1.5 / total;
            expression.joy *= scale;
            expression.sadness *= scale;
            expression.anger *= scale;
            expression.fear *= scale;
            expression.surprise *= scale;
            expression.disgust *= scale;
            expression.trust *= scale;
        }
        expression
    }

    pub fn total(&self) -> f32 {
        self.joy + self.sadness + self.anger + self.fear + self.surprise + self.disgust + self.trust
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmotionChange {
    pub from: CoreEmotion,
    pub to: CoreEmotion,
}

/// Another agent's affect, as felt from a distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContagionSource {
    pub position: Position,
    pub emotion: EmotionAxis,
    pub influence: f32,
}

/// Persistable state of an [`EmotionEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    pub current: EmotionAxis,
    pub target: EmotionAxis,
    pub dominant: CoreEmotion,
}

#[derive(Debug, Clone)]
pub struct EmotionEngine {
    config: EmotionConfig,
    baseline: EmotionAxis,
    current: EmotionAxis,
    target: EmotionAxis,
    dominant: CoreEmotion,
    expression: FacialExpression,
}

impl EmotionEngine {
    pub fn new(config: EmotionConfig) -> Self {
        Self::with_baseline(config, EmotionAxis::default())
    }

    /// Start at rest on a personality baseline
    pub fn with_baseline(config: EmotionConfig, baseline: EmotionAxis) -> Self {
        let baseline = baseline.clamped();
        let mut engine = Self {
            baseline,
            current: baseline,
            target: baseline,
            dominant: CoreEmotion::nearest(&baseline),
            expression: FacialExpression::default(),
            config,
        };
        engine.refresh_expression();
        engine
    }

    pub fn current(&self) -> EmotionAxis {
        self.current
    }

    pub fn target(&self) -> EmotionAxis {
        self.target
    }

    pub fn baseline(&self) -> EmotionAxis {
        self.baseline
    }

    pub fn dominant(&self) -> CoreEmotion {
        self.dominant
    }

    pub fn expression(&self) -> FacialExpression {
        self.expression
    }

    pub fn config(&self) -> &EmotionConfig {
        &self.config
    }

    /// Advance by `dt` seconds. Returns the change if the dominant emotion moved.
    pub fn tick(&mut self, dt: f32) -> Option<EmotionChange> {
        let blend = (self.config.blend_speed * dt * (1.0 - self.config.inertia)).clamp(0.0, 1.0);
        self.current = self.current.lerp(&self.target, blend).clamped();

        let decay = (self.config.decay_rate * dt).clamp(0.0, 1.0);
        self.target = self.target.lerp(&self.baseline, decay).clamped();

        let change = self.update_dominant();
        self.refresh_expression();
        change
    }

    pub fn apply_stimulus(&mut self, emotion: CoreEmotion, intensity: f32) {
        // alpha may exceed 1; the lerp overshoots and the axes clamp
        let alpha = intensity * (1.0 - self.config.inertia);
        self.target = self.target.lerp(&emotion.coordinates(), alpha).clamped();
        log::debug!(
            "Applied {} stimulus ({:.2}) -> target VAD ({:.2}, {:.2}, {:.2})",
            emotion,
            intensity,
            self.target.valence,
            self.target.arousal,
            self.target.dominance
        );
    }

    /// Stimulus by name ("angry", "calm", "Joy", ...)
    pub fn apply_named_stimulus(&mut self, name: &str, intensity: f32) -> CoreEmotion {
        let emotion = CoreEmotion::from_name(name);
        self.apply_stimulus(emotion, intensity);
        emotion
    }

    /// Pull the target toward an arbitrary point of VAD space
    pub fn apply_vad_stimulus(&mut self, point: EmotionAxis) {
        let alpha = 1.0 - self.config.inertia;
        self.target = self.target.lerp(&point, alpha).clamped();
    }

    /// Closeness of the current affect to `emotion`, in [0, 1]
    pub fn intensity_of(&self, emotion: CoreEmotion) -> f32 {
        let distance = self.current.distance(&emotion.coordinates());
        (1.0 - distance / MAX_VAD_DISTANCE).max(0.0)
    }

    /// Intensities of the eight named emotions, in [`CoreEmotion::ALL`] order
    pub fn all_weights(&self) -> Vec<(CoreEmotion, f32)> {
        CoreEmotion::ALL
            .iter()
            .filter(|e| **e != CoreEmotion::Neutral)
            .map(|e| (*e, self.intensity_of(*e)))
            .collect()
    }

    pub fn mood_string(&self) -> String {
        let arousal = self.current.arousal;
        let qualifier = if arousal.abs() > 0.6 {
            if arousal > 0.0 {
                "Intensely "
            } else {
                "Deeply "
            }
        } else if arousal.abs() < 0.2 && self.dominant != CoreEmotion::Neutral {
            "Mildly "
        } else {
            ""
        };
        format!("{}{}", qualifier, self.dominant)
    }

    /// Short tone hint for dialogue generation, e.g. "warm, energetic"
    pub fn dialogue_tone(&self) -> String {
        let mut tone = Vec::new();
        let EmotionAxis {
            valence,
            arousal,
            dominance,
        } = self.current;

        if valence > 0.5 {
            tone.push("warm");
        } else if valence < -0.5 {
            tone.push("harsh");
        }
        if arousal > 0.5 {
            tone.push("energetic");
        } else if arousal < -0.5 {
            tone.push("subdued");
        }
        if dominance > 0.5 {
            tone.push("assertive");
        } else if dominance < -0.5 {
            tone.push("uncertain");
        }

        if tone.is_empty() {
            "neutral".to_string()
        } else {
            tone.join(", ")
        }
    }

    /// Jump straight to `emotion` at `intensity`, skipping the blend
    pub fn set_immediate(&mut self, emotion: CoreEmotion, intensity: f32) -> Option<EmotionChange> {
        self.current = self.baseline.lerp(&emotion.coordinates(), intensity).clamped();
        self.target = self.current;
        let change = self.update_dominant();
        self.refresh_expression();
        change
    }

    /// Let the affect drift home; `current` follows over the next ticks
    pub fn reset_to_baseline(&mut self) {
        self.target = self.baseline;
    }

    /// Mesh morph target weights, scaled by the expression intensity
    pub fn morph_targets(&self) -> Vec<(&'static str, f32)> {
        let e = &self.expression;
        let k = e.intensity;
        vec![
            ("Smile", e.joy * k),
            ("Frown", e.sadness * k),
            ("Anger", e.anger * k),
            ("Fear", e.fear * k),
            ("Surprise", e.surprise * k),
            ("Disgust", e.disgust * k),
            ("Trust", e.trust * k),
            ("EyesWide", e.fear.max(e.surprise) * k),
            ("EyesNarrow", e.anger.max(e.disgust) * k),
            ("BrowsUp", e.surprise * k),
            ("BrowsFurrow", e.anger.max(e.sadness) * k),
        ]
    }

    /// Drift toward the influence-weighted mood of nearby agents.
    ///
    /// Returns true if any source was in range.
    pub fn apply_contagion(&mut self, position: Position, sources: &[ContagionSource]) -> bool {
        if !self.config.contagion_enabled || self.config.contagion_susceptibility <= 0.0 {
            return false;
        }
        let radius = self.config.contagion_radius;
        if radius <= 0.0 {
            return false;
        }

        let mut sum = EmotionAxis::default();
        let mut total_influence = 0.0;
        let mut nearby = 0;
        for source in sources {
            let distance = position.distance(&source.position);
            if distance > radius {
                continue;
            }
            let influence = (1.0 - distance / radius) * source.influence;
            sum.valence += source.emotion.valence * influence;
            sum.arousal += source.emotion.arousal * influence;
            sum.dominance += source.emotion.dominance * influence;
            total_influence += influence;
            nearby += 1;
        }

        if nearby == 0 || total_influence <= 0.0 {
            return false;
        }

        let aggregate = EmotionAxis {
            valence: sum.valence / total_influence,
            arousal: sum.arousal / total_influence,
            dominance: sum.dominance / total_influence,
        };
        let blend = self.config.contagion_susceptibility * total_influence.min(1.0) * 0.1;
        self.apply_vad_stimulus(self.current.lerp(&aggregate, blend));

        log::debug!("Contagion from {} nearby agents (blend {:.3})", nearby, blend);
        true
    }

    pub fn voice_pitch(&self) -> f32 {
        let mut pitch = 1.0 + self.current.arousal * 0.15;
        if self.current.valence < 0.0 {
            pitch += self.current.valence.abs() * 0.05;
        }
        if self.dominant == CoreEmotion::Sadness {
            pitch -= 0.1;
        }
        pitch.clamp(0.8, 1.2)
    }

    pub fn voice_speed(&self) -> f32 {
        let mut speed = 1.0 + self.current.arousal * 0.15;
        match self.dominant {
            CoreEmotion::Fear => speed += 0.1,
            CoreEmotion::Sadness => speed -= 0.15,
            CoreEmotion::Trust => speed -= 0.1,
            _ => {}
        }
        speed.clamp(0.8, 1.2)
    }

    pub fn voice_volume(&self) -> f32 {
        let mut volume = 1.0 + self.current.dominance * 0.15 + self.current.arousal * 0.1;
        match self.dominant {
            CoreEmotion::Anger => volume += 0.2,
            CoreEmotion::Fear | CoreEmotion::Sadness => volume -= 0.15,
            _ => {}
        }
        volume.clamp(0.7, 1.3)
    }

    pub fn snapshot(&self) -> EmotionSnapshot {
        EmotionSnapshot {
            current: self.current,
            target: self.target,
            dominant: self.dominant,
        }
    }

    pub fn restore(&mut self, snapshot: &EmotionSnapshot) {
        self.current = snapshot.current.clamped();
        self.target = snapshot.target.clamped();
        self.dominant = snapshot.dominant;
        self.refresh_expression();
    }

    fn update_dominant(&mut self) -> Option<EmotionChange> {
        let next = CoreEmotion::nearest(&self.current);
        if next == self.dominant {
            return None;
        }
        let change = EmotionChange {
            from: self.dominant,
            to: next,
        };
        self.dominant = next;
        log::debug!("Dominant emotion {} -> {}", change.from, change.to);
        Some(change)
    }

    fn refresh_expression(&mut self) {
        self.expression = FacialExpression::from_axis(&self.current, self.config.expression_intensity);
    }
}

impl Default for EmotionEngine {
    fn default() -> Self {
        Self::new(EmotionConfig::default())
    }
}
