//! Upstream request construction for the NovelAI image-generation API.
//!
//! Maps a canonical [`GenerationRequest`] into the nested payload the API
//! expects, including the dual V4 structured captions. Pure transform, no
//! I/O. The technical parameter block is fixed to values known to work with
//! the one supported model and is not exposed for override, except through
//! the unvalidated extras pass-through.

use crate::params::{Center, CharacterSpec, GenerationRequest};
use serde::Serialize;
use serde_json::Value;

/// The one supported model variant.
pub const MODEL: &str = "nai-diffusion-4-5-full";

/// Fixed sampler for the supported model.
pub const SAMPLER: &str = "k_euler_ancestral";

/// Fixed noise schedule class.
pub const NOISE_SCHEDULE: &str = "karras";

/// Fixed guidance scale.
pub const SCALE: f64 = 6.0;

/// Sigma cutoff above which negative-prompt guidance stops being applied.
pub const SKIP_CFG_ABOVE_SIGMA: f64 = 58.0;

/// Complete request payload for `/ai/generate-image`.
#[derive(Debug, Serialize)]
pub struct GenerationPayload {
    /// Base prompt, repeated at the top level as the API requires
    pub input: String,
    pub model: &'static str,
    pub action: &'static str,
    /// Technical parameters: the fixed block merged with caller extras
    pub parameters: serde_json::Map<String, Value>,
}

/// One character sub-caption anchored to its placement centers.
#[derive(Debug, Serialize)]
pub struct CharacterCaption {
    pub char_caption: String,
    pub centers: Vec<Center>,
}

/// A base caption plus ordered per-character sub-captions.
#[derive(Debug, Serialize)]
pub struct PromptCaption {
    pub base_caption: String,
    pub char_captions: Vec<CharacterCaption>,
}

/// Positive structured caption (V4 prompt).
#[derive(Debug, Serialize)]
pub struct V4Prompt {
    pub caption: PromptCaption,
    /// Coordinate-based placement is in use whenever characters are present
    pub use_coords: bool,
    /// Caption ordering is always honored
    pub use_order: bool,
}

/// Negative structured caption (V4 negative prompt).
#[derive(Debug, Serialize)]
pub struct V4NegativePrompt {
    pub caption: PromptCaption,
    pub legacy_uc: bool,
}

/// Character entry in the flat `characterPrompts` list.
#[derive(Debug, Serialize)]
pub struct CharacterPrompt {
    pub prompt: String,
    /// Negative prompt for this character
    pub uc: String,
    pub center: Center,
    pub enabled: bool,
}

/// Fixed technical parameter block for the supported model.
#[derive(Debug, Serialize)]
struct FixedParameters {
    params_version: u32,
    width: u32,
    height: u32,
    scale: f64,
    sampler: &'static str,
    steps: u32,
    n_samples: u32,
    #[serde(rename = "ucPreset")]
    uc_preset: u32,
    #[serde(rename = "qualityToggle")]
    quality_toggle: bool,
    #[serde(rename = "autoSmea")]
    auto_smea: bool,
    sm: bool,
    sm_dyn: bool,
    dynamic_thresholding: bool,
    controlnet_strength: f64,
    legacy: bool,
    add_original_image: bool,
    cfg_rescale: f64,
    noise_schedule: &'static str,
    legacy_v3_extend: bool,
    skip_cfg_above_sigma: f64,
    use_coords: bool,
    normalize_reference_strength_multiple: bool,
    #[serde(rename = "inpaintImg2ImgStrength")]
    inpaint_img2img_strength: f64,
    #[serde(rename = "characterPrompts")]
    character_prompts: Vec<CharacterPrompt>,
    v4_prompt: V4Prompt,
    v4_negative_prompt: V4NegativePrompt,
    legacy_uc: bool,
    seed: u32,
    negative_prompt: String,
    deliberate_euler_ancestral_bug: bool,
    prefer_brownian: bool,
    image_format: &'static str,
}

/// Build the positive structured caption from the base prompt and each
/// character's positive prompt and center.
fn build_v4_prompt(prompt: &str, characters: &[CharacterSpec]) -> V4Prompt {
    V4Prompt {
        caption: PromptCaption {
            base_caption: prompt.to_string(),
            char_captions: characters
                .iter()
                .map(|c| CharacterCaption {
                    char_caption: c.prompt.clone(),
                    centers: vec![c.center],
                })
                .collect(),
        },
        use_coords: !characters.is_empty(),
        use_order: true,
    }
}

/// Build the negative structured caption from the base negative prompt and
/// each character's negative prompt and center.
fn build_v4_negative_prompt(negative_prompt: &str, characters: &[CharacterSpec]) -> V4NegativePrompt {
    V4NegativePrompt {
        caption: PromptCaption {
            base_caption: negative_prompt.to_string(),
            char_captions: characters
                .iter()
                .map(|c| CharacterCaption {
                    char_caption: c.negative_prompt.clone(),
                    centers: vec![c.center],
                })
                .collect(),
        },
        legacy_uc: false,
    }
}

/// Build the complete upstream payload for a canonical request.
///
/// Caller extras are merged over the fixed parameter block verbatim, last
/// write wins; they are not validated.
pub fn build_payload(request: &GenerationRequest) -> GenerationPayload {
    let fixed = FixedParameters {
        params_version: 3,
        width: request.width,
        height: request.height,
        scale: SCALE,
        sampler: SAMPLER,
        steps: request.steps,
        n_samples: 1,
        uc_preset: 0,
        quality_toggle: true,
        auto_smea: false,
        sm: false,
        sm_dyn: false,
        dynamic_thresholding: false,
        controlnet_strength: 1.0,
        legacy: false,
        add_original_image: true,
        cfg_rescale: 0.0,
        noise_schedule: NOISE_SCHEDULE,
        legacy_v3_extend: false,
        skip_cfg_above_sigma: SKIP_CFG_ABOVE_SIGMA,
        use_coords: !request.characters.is_empty(),
        normalize_reference_strength_multiple: true,
        inpaint_img2img_strength: 1.0,
        character_prompts: request
            .characters
            .iter()
            .map(|c| CharacterPrompt {
                prompt: c.prompt.clone(),
                uc: c.negative_prompt.clone(),
                center: c.center,
                enabled: c.enabled,
            })
            .collect(),
        v4_prompt: build_v4_prompt(&request.prompt, &request.characters),
        v4_negative_prompt: build_v4_negative_prompt(
            &request.negative_prompt,
            &request.characters,
        ),
        legacy_uc: false,
        seed: request.seed,
        negative_prompt: request.negative_prompt.clone(),
        deliberate_euler_ancestral_bug: false,
        prefer_brownian: true,
        image_format: "png",
    };

    let mut parameters = match serde_json::to_value(&fixed) {
        Ok(Value::Object(map)) => map,
        // FixedParameters is a plain struct; it always serializes to an object
        _ => serde_json::Map::new(),
    };
    for (key, value) in request.extra.clone() {
        parameters.insert(key, value);
    }

    GenerationPayload {
        input: request.prompt.clone(),
        model: MODEL,
        action: "generate",
        parameters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::normalize;
    use serde_json::json;

    fn payload_json(args: serde_json::Value) -> serde_json::Value {
        let request = normalize(args).unwrap();
        serde_json::to_value(build_payload(&request)).unwrap()
    }

    #[test]
    fn test_no_characters_scenario() {
        let payload = payload_json(json!({
            "base_prompt": "1girl, blue hair",
            "width": 832,
            "height": 1216
        }));

        assert_eq!(payload["input"], "1girl, blue hair");
        assert_eq!(payload["model"], MODEL);
        assert_eq!(payload["action"], "generate");

        let params = &payload["parameters"];
        assert_eq!(params["width"], 832);
        assert_eq!(params["height"], 1216);
        assert_eq!(params["use_coords"], false);
        assert_eq!(params["characterPrompts"], json!([]));
        assert_eq!(
            params["v4_prompt"]["caption"]["char_captions"],
            json!([]),
            "No synthesized centered entry"
        );
        assert_eq!(params["v4_prompt"]["use_coords"], false);
        assert_eq!(params["v4_prompt"]["use_order"], true);

        let seed = params["seed"].as_u64().expect("seed should be a number");
        assert!(seed <= u64::from(u32::MAX));
    }

    #[test]
    fn test_two_characters_scenario() {
        let payload = payload_json(json!({
            "base_prompt": "two friends in a park",
            "characters": [
                {"prompt": "1girl, red dress", "center_x": 0.3},
                {"prompt": "1boy, blue shirt", "center_x": 0.7}
            ]
        }));

        let params = &payload["parameters"];
        assert_eq!(params["use_coords"], true);
        assert_eq!(params["v4_prompt"]["use_coords"], true);

        let captions = params["v4_prompt"]["caption"]["char_captions"]
            .as_array()
            .unwrap();
        assert_eq!(captions.len(), 2);
        assert_eq!(captions[0]["char_caption"], "1girl, red dress");
        assert_eq!(captions[0]["centers"], json!([{"x": 0.3, "y": 0.5}]));
        assert_eq!(captions[1]["char_caption"], "1boy, blue shirt");
        assert_eq!(captions[1]["centers"], json!([{"x": 0.7, "y": 0.5}]));

        let prompts = params["characterPrompts"].as_array().unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0]["center"]["x"], 0.3);
        assert_eq!(prompts[0]["enabled"], true);
        assert_eq!(prompts[0]["uc"], "");
    }

    #[test]
    fn test_negative_caption_uses_character_negative_prompts() {
        let payload = payload_json(json!({
            "base_prompt": "scene",
            "base_negative_prompt": "blurry",
            "characters": [
                {"prompt": "1girl", "negative_prompt": "bad hands", "center_x": 0.5}
            ]
        }));

        let neg = &payload["parameters"]["v4_negative_prompt"];
        assert_eq!(neg["caption"]["base_caption"], "blurry");
        assert_eq!(neg["caption"]["char_captions"][0]["char_caption"], "bad hands");
        assert_eq!(neg["legacy_uc"], false);
        assert_eq!(payload["parameters"]["negative_prompt"], "blurry");
    }

    #[test]
    fn test_fixed_technical_parameters() {
        let params = payload_json(json!({"base_prompt": "p"}))["parameters"].clone();

        assert_eq!(params["params_version"], 3);
        assert_eq!(params["scale"], 6.0);
        assert_eq!(params["sampler"], SAMPLER);
        assert_eq!(params["steps"], 28);
        assert_eq!(params["n_samples"], 1);
        assert_eq!(params["ucPreset"], 0);
        assert_eq!(params["qualityToggle"], true);
        assert_eq!(params["noise_schedule"], NOISE_SCHEDULE);
        assert_eq!(params["skip_cfg_above_sigma"], 58.0);
        assert_eq!(params["prefer_brownian"], true);
        assert_eq!(params["image_format"], "png");
        assert_eq!(params["sm"], false);
        assert_eq!(params["sm_dyn"], false);
        assert_eq!(params["legacy"], false);
        assert_eq!(params["legacy_uc"], false);
        assert_eq!(params["deliberate_euler_ancestral_bug"], false);
    }

    #[test]
    fn test_extras_merge_verbatim_and_override() {
        let params = payload_json(json!({
            "base_prompt": "p",
            "cfg_rescale": 0.4,
            "custom_flag": true
        }))["parameters"]
            .clone();

        assert_eq!(params["custom_flag"], true, "unknown key carried verbatim");
        assert_eq!(params["cfg_rescale"], 0.4, "extras override the fixed block");
    }

    #[test]
    fn test_two_calls_draw_independent_seeds() {
        let a = payload_json(json!({"base_prompt": "p"}))["parameters"]["seed"].clone();
        let b = payload_json(json!({"base_prompt": "p"}))["parameters"]["seed"].clone();
        assert_ne!(a, b);
    }
}
