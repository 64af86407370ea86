//! Generation-graph templating and patching.
//!
//! A generation graph is a JSON object keyed by node id, each node holding a
//! `class_type` tag and an `inputs` object. Per-shot parameters are written
//! into nodes by matching on the class tag through a [`PatchRegistry`], so
//! built-in graphs and externally authored templates share one code path and
//! unknown node types pass through untouched.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use crate::render_config::RenderConfig;

// ---------------------------------------------------------------------------
// Node classes
// ---------------------------------------------------------------------------

pub const KSAMPLER_CLASS: &str = "KSampler";
pub const CLIP_TEXT_ENCODE_CLASS: &str = "CLIPTextEncode";
pub const EMPTY_LATENT_CLASS: &str = "EmptyLatentImage";
pub const SAVE_IMAGE_CLASS: &str = "SaveImage";
pub const LOAD_IMAGE_CLASS: &str = "LoadImage";
pub const LOAD_CHECKPOINT_CLASS: &str = "CheckpointLoaderSimple";
pub const VAE_DECODE_CLASS: &str = "VAEDecode";
pub const VAE_ENCODE_CLASS: &str = "VAEEncode";

/// Class-tag fragment shared by image-adapter extension nodes.
pub const IMAGE_ADAPTER_TAG: &str = "IPAdapter";

/// Key under which the backend's export format wraps the graph.
const EXPORT_WRAPPER_KEY: &str = "prompt";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow template not found or not JSON: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read workflow template {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workflow template is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Workflow template must contain a JSON object of nodes")]
    NotAnObject,

    #[error("Workflow template does not contain any generation nodes")]
    NoNodes,

    #[error("No checkpoint available; configure a checkpoint or a workflow template")]
    MissingCheckpoint,
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A generation graph keyed by node id, in authoring order.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationGraph(Map<String, Value>);

impl GenerationGraph {
    /// Wrap a node map, unwrapping the export wrapper when present.
    ///
    /// At least one node must carry a non-empty `class_type`.
    pub fn from_value(value: Value) -> Result<Self, WorkflowError> {
        let mut nodes = match value {
            Value::Object(map) => map,
            _ => return Err(WorkflowError::NotAnObject),
        };
        if let Some(Value::Object(inner)) = nodes.get(EXPORT_WRAPPER_KEY) {
            nodes = inner.clone();
        }
        let graph = Self(nodes);
        if graph.node_count() == 0 {
            return Err(WorkflowError::NoNodes);
        }
        Ok(graph)
    }

    /// Number of entries that look like generation nodes.
    pub fn node_count(&self) -> usize {
        self.0
            .values()
            .filter(|node| class_type(node).is_some_and(|c| !c.is_empty()))
            .count()
    }

    /// Node ids whose class tag equals `class`, in graph order.
    pub fn node_ids_of_class(&self, class: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, node)| class_type(node) == Some(class))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Read a single input value of a node.
    pub fn input(&self, node_id: &str, key: &str) -> Option<&Value> {
        self.0.get(node_id)?.get("inputs")?.get(key)
    }

    /// Whether any node conditions generation on an input image.
    pub fn is_image_conditioned(&self) -> bool {
        self.0.values().filter_map(class_type).any(|class| {
            class == LOAD_IMAGE_CLASS || class.contains(IMAGE_ADAPTER_TAG)
        })
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Apply every matching rule of `registry` to this graph.
    pub fn apply(&mut self, registry: &PatchRegistry, params: &ShotParams<'_>) {
        for rule in &registry.rules {
            let mut ordinal = 0;
            for node in self.0.values_mut() {
                let Some(class) = class_type(node) else {
                    continue;
                };
                if !rule.matcher.matches(class) {
                    continue;
                }
                if let Some(inputs) = inputs_mut(node) {
                    (rule.patch)(inputs, params, ordinal);
                }
                ordinal += 1;
            }
        }
    }

    /// Set the configured denoise on samplers exposing it. Graphs without an
    /// image input start from an empty latent and keep full denoise.
    pub fn apply_denoise(&mut self, config: &RenderConfig) {
        if !self.is_image_conditioned() {
            return;
        }
        for node in self.0.values_mut() {
            if class_type(node) != Some(KSAMPLER_CLASS) {
                continue;
            }
            if let Some(inputs) = inputs_mut(node) {
                if inputs.contains_key("denoise") {
                    inputs.insert("denoise".into(), json!(config.denoise));
                }
            }
        }
    }
}

fn class_type(node: &Value) -> Option<&str> {
    node.get("class_type")?.as_str()
}

/// The node's `inputs` object, created when missing. Nodes whose inputs are
/// not an object are left alone.
fn inputs_mut(node: &mut Value) -> Option<&mut Map<String, Value>> {
    let node = node.as_object_mut()?;
    node.entry("inputs")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Parse a template from JSON text.
pub fn parse_template(raw: &str) -> Result<GenerationGraph, WorkflowError> {
    let value: Value = serde_json::from_str(raw)?;
    GenerationGraph::from_value(value)
}

/// Load a template file. The path must exist and carry a `.json` extension.
pub fn load_template(path: &Path) -> Result<GenerationGraph, WorkflowError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if !is_json || !path.is_file() {
        return Err(WorkflowError::NotFound(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path).map_err(|source| WorkflowError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_template(&raw)
}

// ---------------------------------------------------------------------------
// Per-shot parameters
// ---------------------------------------------------------------------------

/// Everything a shot writes into its graph.
#[derive(Debug, Clone, Copy)]
pub struct ShotParams<'a> {
    pub positive: &'a str,
    pub negative: &'a str,
    pub seed: i64,
    pub prefix: &'a str,
    /// Backend-side name of the uploaded reference image.
    pub reference_image: Option<&'a str>,
    pub config: &'a RenderConfig,
}

/// Output filename prefix for a shot: `shot-<index+1, 3 digits>-<seed>`.
pub fn shot_prefix(index: usize, seed: i64) -> String {
    format!("shot-{:03}-{}", index + 1, seed)
}

// ---------------------------------------------------------------------------
// Patch registry
// ---------------------------------------------------------------------------

/// Patch function applied to a matching node's inputs. `ordinal` counts the
/// matching nodes seen so far for the same rule.
pub type PatchFn = fn(&mut Map<String, Value>, &ShotParams<'_>, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatch {
    Exact(&'static str),
    Contains(&'static str),
}

impl TagMatch {
    fn matches(&self, class: &str) -> bool {
        match self {
            Self::Exact(tag) => class == *tag,
            Self::Contains(fragment) => class.contains(fragment),
        }
    }
}

#[derive(Clone, Copy)]
pub struct PatchRule {
    pub matcher: TagMatch,
    pub patch: PatchFn,
}

impl std::fmt::Debug for PatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchRule")
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

/// Ordered set of patch rules keyed by class tag.
#[derive(Debug, Clone, Default)]
pub struct PatchRegistry {
    rules: Vec<PatchRule>,
}

impl PatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, matcher: TagMatch, patch: PatchFn) -> Self {
        self.rules.push(PatchRule { matcher, patch });
        self
    }

    /// Rules applied to every shot graph.
    pub fn standard() -> Self {
        Self::new()
            .register(TagMatch::Exact(CLIP_TEXT_ENCODE_CLASS), patch_text_encode)
            .register(TagMatch::Exact(KSAMPLER_CLASS), patch_sampler)
            .register(TagMatch::Exact(EMPTY_LATENT_CLASS), patch_latent_size)
            .register(TagMatch::Exact(SAVE_IMAGE_CLASS), patch_save_prefix)
            .register(TagMatch::Exact(LOAD_IMAGE_CLASS), patch_load_image)
            .register(TagMatch::Contains(IMAGE_ADAPTER_TAG), patch_image_adapter)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn patch_text_encode(inputs: &mut Map<String, Value>, params: &ShotParams<'_>, ordinal: usize) {
    let text = match ordinal {
        0 => params.positive,
        1 => params.negative,
        _ => return,
    };
    inputs.insert("text".into(), json!(text));
}

fn patch_sampler(inputs: &mut Map<String, Value>, params: &ShotParams<'_>, _: usize) {
    let config = params.config;
    inputs.insert("seed".into(), json!(params.seed));
    inputs.insert("steps".into(), json!(config.steps));
    inputs.insert("cfg".into(), json!(config.cfg));
    inputs.insert("sampler_name".into(), json!(config.sampler));
    inputs.insert("scheduler".into(), json!(config.scheduler));
}

fn patch_latent_size(inputs: &mut Map<String, Value>, params: &ShotParams<'_>, _: usize) {
    inputs.insert("width".into(), json!(params.config.width));
    inputs.insert("height".into(), json!(params.config.height));
    inputs.insert("batch_size".into(), json!(1));
}

fn patch_save_prefix(inputs: &mut Map<String, Value>, params: &ShotParams<'_>, _: usize) {
    inputs.insert("filename_prefix".into(), json!(params.prefix));
}

fn patch_load_image(inputs: &mut Map<String, Value>, params: &ShotParams<'_>, _: usize) {
    if let Some(image) = params.reference_image {
        inputs.insert("image".into(), json!(image));
    }
}

fn patch_image_adapter(inputs: &mut Map<String, Value>, params: &ShotParams<'_>, _: usize) {
    let Some(image) = params.reference_image else {
        return;
    };
    if inputs.contains_key("weight") {
        inputs.insert("weight".into(), json!(params.config.reference_strength));
    }
    if inputs.contains_key("image") {
        inputs.insert("image".into(), json!(image));
    }
}

// ---------------------------------------------------------------------------
// Built-in graphs
// ---------------------------------------------------------------------------

/// Text-to-image graph: checkpoint, empty latent, two text encoders,
/// full-denoise sampler, decode, save.
pub fn builtin_text2img(checkpoint: &str, params: &ShotParams<'_>) -> GenerationGraph {
    let config = params.config;
    GenerationGraph(object(json!({
        "3": {
            "class_type": KSAMPLER_CLASS,
            "inputs": {
                "seed": 0,
                "steps": config.steps,
                "cfg": config.cfg,
                "sampler_name": config.sampler,
                "scheduler": config.scheduler,
                "denoise": 1,
                "model": ["4", 0],
                "positive": ["6", 0],
                "negative": ["7", 0],
                "latent_image": ["5", 0]
            }
        },
        "4": { "class_type": LOAD_CHECKPOINT_CLASS, "inputs": { "ckpt_name": checkpoint } },
        "5": {
            "class_type": EMPTY_LATENT_CLASS,
            "inputs": { "width": config.width, "height": config.height, "batch_size": 1 }
        },
        "6": { "class_type": CLIP_TEXT_ENCODE_CLASS, "inputs": { "text": "", "clip": ["4", 1] } },
        "7": { "class_type": CLIP_TEXT_ENCODE_CLASS, "inputs": { "text": "", "clip": ["4", 1] } },
        "8": { "class_type": VAE_DECODE_CLASS, "inputs": { "samples": ["3", 0], "vae": ["4", 2] } },
        "9": {
            "class_type": SAVE_IMAGE_CLASS,
            "inputs": { "filename_prefix": params.prefix, "images": ["8", 0] }
        }
    })))
}

/// Image-to-image graph: the reference image is loaded and encoded into the
/// sampler's latent, and the configured denoise strength applies.
pub fn builtin_img2img(checkpoint: &str, image: &str, params: &ShotParams<'_>) -> GenerationGraph {
    let config = params.config;
    GenerationGraph(object(json!({
        "10": { "class_type": LOAD_CHECKPOINT_CLASS, "inputs": { "ckpt_name": checkpoint } },
        "11": { "class_type": LOAD_IMAGE_CLASS, "inputs": { "image": image } },
        "12": { "class_type": VAE_ENCODE_CLASS, "inputs": { "pixels": ["11", 0], "vae": ["10", 2] } },
        "13": { "class_type": CLIP_TEXT_ENCODE_CLASS, "inputs": { "text": "", "clip": ["10", 1] } },
        "14": { "class_type": CLIP_TEXT_ENCODE_CLASS, "inputs": { "text": "", "clip": ["10", 1] } },
        "15": {
            "class_type": KSAMPLER_CLASS,
            "inputs": {
                "seed": 0,
                "steps": config.steps,
                "cfg": config.cfg,
                "sampler_name": config.sampler,
                "scheduler": config.scheduler,
                "denoise": config.denoise,
                "model": ["10", 0],
                "positive": ["13", 0],
                "negative": ["14", 0],
                "latent_image": ["12", 0]
            }
        },
        "16": { "class_type": VAE_DECODE_CLASS, "inputs": { "samples": ["15", 0], "vae": ["10", 2] } },
        "17": {
            "class_type": SAVE_IMAGE_CLASS,
            "inputs": { "filename_prefix": params.prefix, "images": ["16", 0] }
        }
    })))
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ---------------------------------------------------------------------------
// Source selection
// ---------------------------------------------------------------------------

/// Where shot graphs come from. Chosen once per job.
#[derive(Debug, Clone)]
pub enum WorkflowSource {
    /// An externally supplied graph, copied per shot and never mutated.
    Template(GenerationGraph),
    /// A synthesized graph around the given checkpoint.
    BuiltIn { checkpoint: String },
}

impl WorkflowSource {
    /// Pick the source: a configured template wins, otherwise a checkpoint
    /// is required for the built-in graphs.
    pub fn resolve(
        template: Option<GenerationGraph>,
        checkpoint: Option<String>,
    ) -> Result<Self, WorkflowError> {
        if let Some(graph) = template {
            return Ok(Self::Template(graph));
        }
        checkpoint
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .map(|checkpoint| Self::BuiltIn { checkpoint })
            .ok_or(WorkflowError::MissingCheckpoint)
    }

    pub fn is_template(&self) -> bool {
        matches!(self, Self::Template(_))
    }

    /// Produce the fully patched graph for one shot.
    pub fn build(&self, registry: &PatchRegistry, params: &ShotParams<'_>) -> GenerationGraph {
        let mut graph = match self {
            Self::Template(template) => template.clone(),
            Self::BuiltIn { checkpoint } => match params.reference_image {
                Some(image) => builtin_img2img(checkpoint, image, params),
                None => builtin_text2img(checkpoint, params),
            },
        };
        graph.apply(registry, params);
        graph.apply_denoise(params.config);
        graph
    }
}
