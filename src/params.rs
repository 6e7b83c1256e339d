//! Parameter normalization for the `generate_image` tool.
//!
//! Converts the loosely-typed argument bag delivered by the protocol layer
//! into a canonical, fully-defaulted [`GenerationRequest`]. This is a pure
//! transform: no I/O, no shared state, one fresh seed drawn per call.

use crate::error::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Default image width in pixels (portrait).
pub const DEFAULT_WIDTH: u32 = 832;

/// Default image height in pixels (portrait).
pub const DEFAULT_HEIGHT: u32 = 1216;

/// Maximum sampling steps on the NovelAI free tier; larger values are clamped.
pub const MAX_FREE_STEPS: u32 = 28;

/// Minimum pixel dimension accepted by the API.
pub const MIN_DIMENSION: u32 = 64;

/// Maximum pixel dimension accepted by the API.
pub const MAX_DIMENSION: u32 = 1536;

/// Both dimensions must be multiples of this value.
pub const DIMENSION_STEP: u32 = 64;

/// Default global negative prompt applied when the caller supplies none.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "lowres, bad anatomy, bad hands, text, error, \
     missing fingers, extra digit, fewer digits, cropped, worst quality, low quality, \
     normal quality, jpeg artifacts, signature, watermark, username, blurry";

/// Normalized placement center for a character, in [0, 1] coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Center {
    pub x: f64,
    pub y: f64,
}

/// One character entry of the canonical request. List order is significant
/// and preserved end-to-end into the upstream structured captions.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterSpec {
    /// Positive prompt for this character
    pub prompt: String,
    /// Per-character negative prompt, empty when not supplied
    pub negative_prompt: String,
    /// Placement center; y defaults to 0.5 when absent
    pub center: Center,
    /// Always true in this flow
    pub enabled: bool,
}

/// Canonical, fully-defaulted generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Base scene/style prompt
    pub prompt: String,
    /// Base negative prompt (defaulted when absent)
    pub negative_prompt: String,
    /// Ordered character list; empty means no character captions
    pub characters: Vec<CharacterSpec>,
    /// Pixel width, multiple of 64 in [64, 1536]
    pub width: u32,
    /// Pixel height, multiple of 64 in [64, 1536]
    pub height: u32,
    /// Sampling steps, clamped to the free-tier maximum
    pub steps: u32,
    /// Fresh seed, drawn uniformly from the full 32-bit space on every call
    pub seed: u32,
    /// Unrecognized caller fields, merged verbatim into the outgoing
    /// technical parameters. Unvalidated, forward-compatible only.
    pub extra: serde_json::Map<String, Value>,
}

/// A value that may arrive as a single object or an array of objects.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Raw character entry as documented in the tool schema.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CharacterArgs {
    /// Detailed description of this character, e.g. "1girl, blue hair,
    /// school uniform, smiling, detailed face". Describe each character
    /// separately in multi-character scenes.
    pub prompt: String,
    /// Extra negative prompt for this character only, stacked on top of the
    /// global base_negative_prompt. Empty if the character needs nothing
    /// special.
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Horizontal placement in [0, 1]: 0 = far left, 0.5 = centered,
    /// 1 = far right. Use 0.5 for a single character, 0.3 and 0.7 for two.
    pub center_x: f64,
    /// Vertical placement in [0, 1]: 0 = top, 0.5 = centered, 1 = bottom.
    /// Defaults to 0.5 when omitted.
    #[serde(default)]
    pub center_y: Option<f64>,
}

/// Raw tool arguments as documented in the tool schema. Unknown fields are
/// collected and forwarded to the API unvalidated.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateImageArgs {
    /// Global scene and style description: overall setting, mood, art style,
    /// quality tags, e.g. "masterpiece, best quality, detailed background,
    /// cherry blossoms, sunset". Put individual characters in `characters`,
    /// not here.
    #[serde(default, alias = "prompt", alias = "input")]
    pub base_prompt: Option<String>,
    /// Global negative prompt describing what to avoid. Leave empty to use
    /// the built-in default.
    #[serde(default)]
    pub base_negative_prompt: Option<String>,
    /// Character list. Use this for single- and multi-character scenes alike:
    /// one centered entry (x=0.5) for a single character, one entry per
    /// character otherwise. A single object is accepted and treated as a
    /// one-element list.
    #[serde(default)]
    pub characters: Option<OneOrMany<CharacterArgs>>,
    /// Image width in pixels, a multiple of 64 in 64-1536. Common values:
    /// 832 (portrait), 1216 (landscape), 1024 (square). Default 832.
    #[serde(default)]
    pub width: Option<u32>,
    /// Image height in pixels, a multiple of 64 in 64-1536. Common values:
    /// 1216 (portrait), 832 (landscape), 1024 (square). Default 1216.
    #[serde(default)]
    pub height: Option<u32>,
    /// Sampling steps, locked to 28 (the free-tier maximum; anything above
    /// is clamped down). Default 28.
    #[serde(default)]
    pub steps: Option<u32>,
    /// Unrecognized fields pass through to the API verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Normalize a raw tool-argument value into a canonical [`GenerationRequest`].
///
/// The argument may arrive as a JSON-encoded string, which is parsed first.
/// Fails with [`Error::MalformedArguments`] on any shape violation and with
/// [`Error::MissingPrompt`] when no prompt is present under any accepted
/// field name. Width and height are rejected, not corrected, when they break
/// the multiple-of-64 or range constraints.
pub fn normalize(args: Value) -> Result<GenerationRequest, Error> {
    let value = match args {
        Value::String(s) => serde_json::from_str(&s)
            .map_err(|e| Error::malformed(format!("Failed to parse arguments as JSON: {e}")))?,
        other => other,
    };

    let raw: GenerateImageArgs =
        serde_json::from_value(value).map_err(|e| Error::malformed(e.to_string()))?;

    let prompt = raw
        .base_prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or(Error::MissingPrompt)?;

    let negative_prompt = raw
        .base_negative_prompt
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_NEGATIVE_PROMPT.to_string());

    let width = raw.width.unwrap_or(DEFAULT_WIDTH);
    let height = raw.height.unwrap_or(DEFAULT_HEIGHT);
    validate_dimension("width", width)?;
    validate_dimension("height", height)?;

    let steps = match raw.steps {
        None => MAX_FREE_STEPS,
        Some(0) => return Err(Error::malformed("steps must be a positive integer")),
        Some(s) => s.min(MAX_FREE_STEPS),
    };

    let raw_characters = match raw.characters {
        None => Vec::new(),
        Some(OneOrMany::One(c)) => vec![c],
        Some(OneOrMany::Many(cs)) => cs,
    };
    let characters = raw_characters
        .into_iter()
        .map(normalize_character)
        .collect::<Result<Vec<_>, _>>()?;

    let mut extra = raw.extra;
    // A fresh seed is drawn per call; caller-supplied seeds are not accepted.
    extra.remove("seed");

    let seed: u32 = rand::random();
    debug!(seed, width, height, characters = characters.len(), "Normalized generation request");

    Ok(GenerationRequest {
        prompt,
        negative_prompt,
        characters,
        width,
        height,
        steps,
        seed,
        extra,
    })
}

fn normalize_character(raw: CharacterArgs) -> Result<CharacterSpec, Error> {
    validate_coordinate("center_x", raw.center_x)?;
    let y = raw.center_y.unwrap_or(0.5);
    validate_coordinate("center_y", y)?;

    Ok(CharacterSpec {
        prompt: raw.prompt,
        negative_prompt: raw.negative_prompt.unwrap_or_default(),
        center: Center { x: raw.center_x, y },
        enabled: true,
    })
}

fn validate_dimension(name: &str, value: u32) -> Result<(), Error> {
    if value < MIN_DIMENSION || value > MAX_DIMENSION || value % DIMENSION_STEP != 0 {
        return Err(Error::malformed(format!(
            "{name} must be a multiple of {DIMENSION_STEP} between {MIN_DIMENSION} and \
             {MAX_DIMENSION}, got {value}"
        )));
    }
    Ok(())
}

fn validate_coordinate(name: &str, value: f64) -> Result<(), Error> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::malformed(format!(
            "{name} must be between 0 and 1, got {value}"
        )));
    }
    Ok(())
}
