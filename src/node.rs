//! Host plugin contract.
//!
//! A host discovers nodes through a [`NodeRegistry`], reads each node's
//! declared inputs and outputs, and calls [`Node::execute`] with resolved
//! input values. Nodes that must run on every evaluation report
//! [`CachePolicy::AlwaysRerun`].

use crate::capture::{
    CaptureRequest, DeviceOpener, SourceConfig, APERTURE_RANGE, BRIGHTNESS_RANGE,
    DEVICE_ID_RANGE, EXPOSURE_RANGE, HEIGHT_RANGE, WIDTH_RANGE,
};
use crate::source::{CameraFrameSource, CaptureError, SourceStats};
use crate::tensor::ImageTensor;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Type name of image outputs.
pub const IMAGE_TYPE: &str = "IMAGE";

/// Errors returned from node execution.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A host input has the wrong type or is out of range.
    #[error("invalid input {name}: {reason}")]
    InvalidInput {
        /// Input name.
        name: String,
        /// What was wrong with the value.
        reason: String,
    },
    /// The capture itself failed.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    /// The schema could not be rendered.
    #[error("failed to serialize schema: {0}")]
    Schema(#[from] toml::ser::Error),
}

// TOML integers are signed 64-bit, so unsigned bounds go out as strings.
fn as_string<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Declared input parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum InputSpec {
    /// Signed integer input with a UI step.
    Int {
        /// Input name.
        name: &'static str,
        /// Value used when the host omits the input.
        default: i64,
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
        /// UI increment.
        step: i64,
    },
    /// Unsigned 64-bit input, used for seeds.
    Uint {
        /// Input name.
        name: &'static str,
        /// Value used when the host omits the input.
        #[serde(serialize_with = "as_string")]
        default: u64,
        /// Smallest accepted value.
        #[serde(serialize_with = "as_string")]
        min: u64,
        /// Largest accepted value.
        #[serde(serialize_with = "as_string")]
        max: u64,
    },
    /// Floating point input with a UI step.
    Float {
        /// Input name.
        name: &'static str,
        /// Value used when the host omits the input.
        default: f64,
        /// Smallest accepted value.
        min: f64,
        /// Largest accepted value.
        max: f64,
        /// UI increment.
        step: f64,
    },
}

impl InputSpec {
    /// Parameter name as seen by the host.
    pub fn name(&self) -> &'static str {
        match *self {
            InputSpec::Int { name, .. }
            | InputSpec::Uint { name, .. }
            | InputSpec::Float { name, .. } => name,
        }
    }

    /// Default value.
    pub fn default_value(&self) -> ParamValue {
        match self {
            InputSpec::Int { default, .. } => ParamValue::Int(*default),
            InputSpec::Uint { default, .. } => ParamValue::Uint(*default),
            InputSpec::Float { default, .. } => ParamValue::Float(*default),
        }
    }

    /// Checks `value` against this input's type and range.
    pub fn check(&self, value: ParamValue) -> Result<ParamValue, NodeError> {
        let invalid = |reason: String| NodeError::InvalidInput {
            name: self.name().to_string(),
            reason,
        };

        match (self, value) {
            (InputSpec::Int { min, max, .. }, ParamValue::Int(v)) => {
                if (*min..=*max).contains(&v) {
                    Ok(value)
                } else {
                    Err(invalid(format!("{v} outside {min}..={max}")))
                }
            }
            (InputSpec::Uint { min, max, .. }, ParamValue::Uint(v)) => {
                if (*min..=*max).contains(&v) {
                    Ok(value)
                } else {
                    Err(invalid(format!("{v} outside {min}..={max}")))
                }
            }
            (InputSpec::Uint { .. }, ParamValue::Int(v)) => {
                let v = u64::try_from(v).map_err(|_| invalid(format!("{v} is negative")))?;
                self.check(ParamValue::Uint(v))
            }
            (InputSpec::Float { min, max, .. }, ParamValue::Float(v)) => {
                if (*min..=*max).contains(&v) {
                    Ok(value)
                } else {
                    Err(invalid(format!("{v} outside {min}..={max}")))
                }
            }
            (InputSpec::Float { .. }, ParamValue::Int(v)) => {
                self.check(ParamValue::Float(v as f64))
            }
            (_, other) => Err(invalid(format!("unexpected {} value", other.kind()))),
        }
    }
}

/// Declared output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSpec {
    /// Output name.
    pub name: &'static str,
    /// Host type name, such as [`IMAGE_TYPE`].
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Descriptive metadata a host shows for a node class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeMetadata {
    /// Registered class name.
    pub class_name: &'static str,
    /// Menu category.
    pub category: &'static str,
    /// Entry point name.
    pub function: &'static str,
    /// Whether the node is a graph output.
    pub output_node: bool,
}

/// Whether a host may reuse a node's previous result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CachePolicy {
    /// Reuse results while inputs are unchanged.
    Reuse,
    /// Execute on every evaluation.
    AlwaysRerun,
}

/// Input value supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Floating point number.
    Float(f64),
}

impl ParamValue {
    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "int",
            ParamValue::Uint(_) => "uint",
            ParamValue::Float(_) => "float",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Uint(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Named input values for one execution.
#[derive(Debug, Clone, Default)]
pub struct NodeInputs {
    values: BTreeMap<String, ParamValue>,
}

impl NodeInputs {
    /// Empty input set; every input takes its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, returning self for chaining.
    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets `name` to `value`.
    pub fn insert(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }

    /// Looks up `name`.
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.values.get(name).copied()
    }

    /// Resolves every declared input, filling defaults and checking ranges.
    pub fn resolve(
        &self,
        schema: &[InputSpec],
    ) -> Result<BTreeMap<&'static str, ParamValue>, NodeError> {
        schema
            .iter()
            .map(|spec| {
                let value = self.get(spec.name()).unwrap_or_else(|| spec.default_value());
                spec.check(value).map(|v| (spec.name(), v))
            })
            .collect()
    }
}

/// A value produced by a node.
#[derive(Debug, Clone)]
pub enum NodeOutput {
    /// Normalized RGB image.
    Image(ImageTensor),
}

/// A host-executable node.
pub trait Node {
    /// Class metadata.
    fn metadata(&self) -> NodeMetadata;

    /// Declared inputs.
    fn input_schema(&self) -> Vec<InputSpec>;

    /// Declared outputs.
    fn outputs(&self) -> Vec<OutputSpec>;

    /// Result caching behavior.
    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::Reuse
    }

    /// Host change hook. Nodes that opt out of caching always report a
    /// change.
    fn is_changed(&self, _inputs: &NodeInputs) -> bool {
        self.cache_policy() == CachePolicy::AlwaysRerun
    }

    /// Runs the node.
    fn execute(&mut self, inputs: &NodeInputs) -> Result<Vec<NodeOutput>, NodeError>;
}

/// Everything a host needs to present a node class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSchema {
    /// Result caching behavior.
    pub cache_policy: CachePolicy,
    /// Class metadata.
    pub metadata: NodeMetadata,
    /// Declared inputs, in display order.
    pub inputs: Vec<InputSpec>,
    /// Declared outputs.
    pub outputs: Vec<OutputSpec>,
}

impl NodeSchema {
    /// Collects the schema of `node`.
    pub fn of(node: &dyn Node) -> Self {
        Self {
            cache_policy: node.cache_policy(),
            metadata: node.metadata(),
            inputs: node.input_schema(),
            outputs: node.outputs(),
        }
    }

    /// Renders the schema as a TOML document.
    pub fn to_toml(&self) -> Result<String, NodeError> {
        Ok(toml::to_string(self)?)
    }
}

/// Factory creating a fresh node instance.
pub type NodeFactory = Box<dyn Fn() -> Box<dyn Node> + Send + Sync>;

/// Class name to factory mapping exposed to the host.
#[derive(Default)]
pub struct NodeRegistry {
    factories: BTreeMap<&'static str, NodeFactory>,
}

impl NodeRegistry {
    /// Registry with no classes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `class_name`, replacing any previous entry.
    pub fn register<F>(&mut self, class_name: &'static str, factory: F)
    where
        F: Fn() -> Box<dyn Node> + Send + Sync + 'static,
    {
        self.factories.insert(class_name, Box::new(factory));
    }

    /// Creates a node of class `class_name`.
    pub fn create(&self, class_name: &str) -> Option<Box<dyn Node>> {
        self.factories.get(class_name).map(|factory| factory())
    }

    /// Registered class names, sorted.
    pub fn class_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("classes", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Registry with the webcam node backed by local cameras.
#[cfg(feature = "camera")]
pub fn default_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    let class_name = WebcamCaptureNode::<crate::capture::NokhwaOpener>::CLASS_NAME;
    registry.register(class_name, || {
        Box::new(WebcamCaptureNode::new(crate::capture::NokhwaOpener::new()))
    });
    registry
}

/// Node that captures one webcam frame per execution.
pub struct WebcamCaptureNode<O: DeviceOpener> {
    source: CameraFrameSource<O>,
}

impl<O: DeviceOpener> WebcamCaptureNode<O> {
    /// Registered class name.
    pub const CLASS_NAME: &'static str = "WebcamCapture";

    /// Node over `opener` with the default warm-up.
    pub fn new(opener: O) -> Self {
        Self::with_config(opener, SourceConfig::default())
    }

    /// Node over `opener` with the given warm-up.
    pub fn with_config(opener: O, config: SourceConfig) -> Self {
        Self {
            source: CameraFrameSource::with_config(opener, config),
        }
    }

    /// The node's frame source.
    pub fn source(&self) -> &CameraFrameSource<O> {
        &self.source
    }

    /// Source activity counters.
    pub fn stats(&self) -> &SourceStats {
        self.source.stats()
    }

    /// Input schema shared by every instance.
    pub fn schema() -> Vec<InputSpec> {
        let flag = |name, default| InputSpec::Int {
            name,
            default,
            min: 0,
            max: 1,
            step: 1,
        };

        vec![
            InputSpec::Int {
                name: "cam_id",
                default: 0,
                min: i64::from(*DEVICE_ID_RANGE.start()),
                max: i64::from(*DEVICE_ID_RANGE.end()),
                step: 1,
            },
            InputSpec::Int {
                name: "width",
                default: 720,
                min: i64::from(*WIDTH_RANGE.start()),
                max: i64::from(*WIDTH_RANGE.end()),
                step: 8,
            },
            InputSpec::Int {
                name: "height",
                default: 480,
                min: i64::from(*HEIGHT_RANGE.start()),
                max: i64::from(*HEIGHT_RANGE.end()),
                step: 8,
            },
            InputSpec::Float {
                name: "brightness",
                default: 0.5,
                min: *BRIGHTNESS_RANGE.start(),
                max: *BRIGHTNESS_RANGE.end(),
                step: 0.05,
            },
            InputSpec::Int {
                name: "exposure",
                default: 0,
                min: i64::from(*EXPOSURE_RANGE.start()),
                max: i64::from(*EXPOSURE_RANGE.end()),
                step: 1,
            },
            InputSpec::Float {
                name: "aperture",
                default: 1.8,
                min: *APERTURE_RANGE.start(),
                max: *APERTURE_RANGE.end(),
                step: 0.2,
            },
            flag("autoexp", 1),
            flag("autofocus", 1),
            flag("autowb", 0),
            InputSpec::Uint {
                name: "seed",
                default: 0,
                min: 0,
                max: u64::MAX,
            },
        ]
    }

    /// Builds a capture request from host inputs.
    pub fn request_from(inputs: &NodeInputs) -> Result<CaptureRequest, NodeError> {
        let values = inputs.resolve(&Self::schema())?;

        let int = |name: &str| match values.get(name) {
            Some(ParamValue::Int(v)) => *v,
            _ => 0,
        };
        let float = |name: &str| match values.get(name) {
            Some(ParamValue::Float(v)) => *v,
            _ => 0.0,
        };
        let seed = match values.get("seed") {
            Some(ParamValue::Uint(v)) => *v,
            _ => 0,
        };

        // Ranges were checked by `resolve`, so the narrowing casts are lossless.
        let request = CaptureRequest {
            device_id: int("cam_id") as u32,
            width: int("width") as u32,
            height: int("height") as u32,
            brightness: float("brightness"),
            exposure: int("exposure") as i32,
            aperture: float("aperture"),
            auto_exposure: int("autoexp") != 0,
            autofocus: int("autofocus") != 0,
            auto_white_balance: int("autowb") != 0,
            seed,
        };
        Ok(request)
    }
}

impl<O: DeviceOpener> Node for WebcamCaptureNode<O> {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            class_name: Self::CLASS_NAME,
            category: "image",
            function: "run",
            output_node: true,
        }
    }

    fn input_schema(&self) -> Vec<InputSpec> {
        Self::schema()
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec {
            name: IMAGE_TYPE,
            kind: IMAGE_TYPE,
        }]
    }

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::AlwaysRerun
    }

    fn execute(&mut self, inputs: &NodeInputs) -> Result<Vec<NodeOutput>, NodeError> {
        let request = Self::request_from(inputs)?;
        let image = self.source.capture(&request)?;
        Ok(vec![NodeOutput::Image(image)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MockDevice, MockOpener};
    use crate::source::DeviceState;

    fn node(opener: MockOpener) -> WebcamCaptureNode<MockOpener> {
        WebcamCaptureNode::with_config(opener, SourceConfig::immediate())
    }

    #[test]
    fn test_schema_matches_declared_inputs() {
        let schema = WebcamCaptureNode::<MockOpener>::schema();
        let names: Vec<_> = schema.iter().map(InputSpec::name).collect();
        assert_eq!(
            names,
            vec![
                "cam_id", "width", "height", "brightness", "exposure", "aperture", "autoexp",
                "autofocus", "autowb", "seed"
            ]
        );
        assert!(schema.contains(&InputSpec::Int {
            name: "width",
            default: 720,
            min: 256,
            max: 1920,
            step: 8,
        }));
        assert!(schema.contains(&InputSpec::Uint {
            name: "seed",
            default: 0,
            min: 0,
            max: u64::MAX,
        }));
    }

    #[test]
    fn test_defaults_match_request_defaults() {
        let request = WebcamCaptureNode::<MockOpener>::request_from(&NodeInputs::new()).unwrap();
        assert_eq!(request, CaptureRequest::default());
    }

    #[test]
    fn test_request_from_inputs() {
        let inputs = NodeInputs::new()
            .with("cam_id", ParamValue::Int(3))
            .with("brightness", ParamValue::Int(1))
            .with("autowb", ParamValue::Int(1))
            .with("seed", ParamValue::Uint(u64::MAX));

        let request = WebcamCaptureNode::<MockOpener>::request_from(&inputs).unwrap();

        assert_eq!(request.device_id, 3);
        assert_eq!(request.brightness, 1.0);
        assert!(request.auto_white_balance);
        assert_eq!(request.seed, u64::MAX);
    }

    #[test]
    fn test_out_of_range_input_rejected() {
        let inputs = NodeInputs::new().with("height", ParamValue::Int(2000));
        let result = WebcamCaptureNode::<MockOpener>::request_from(&inputs);
        assert!(matches!(
            result,
            Err(NodeError::InvalidInput { ref name, .. }) if name == "height"
        ));
    }

    #[test]
    fn test_float_for_int_rejected() {
        let inputs = NodeInputs::new().with("exposure", ParamValue::Float(1.5));
        assert!(WebcamCaptureNode::<MockOpener>::request_from(&inputs).is_err());
    }

    #[test]
    fn test_always_changed() {
        let node = node(MockOpener::new());
        let inputs = NodeInputs::new();

        assert_eq!(node.cache_policy(), CachePolicy::AlwaysRerun);
        assert!(node.is_changed(&inputs));
        assert!(node.is_changed(&inputs));
    }

    #[test]
    fn test_metadata_and_outputs() {
        let node = node(MockOpener::new());
        let meta = node.metadata();

        assert_eq!(meta.class_name, "WebcamCapture");
        assert_eq!(meta.category, "image");
        assert!(meta.output_node);
        assert_eq!(
            node.outputs(),
            vec![OutputSpec {
                name: "IMAGE",
                kind: "IMAGE"
            }]
        );
    }

    #[test]
    fn test_execute_returns_image() {
        let opener =
            MockOpener::new().with_device(0, MockDevice::default().with_resolution(640, 480));
        let mut node = node(opener);

        let outputs = node.execute(&NodeInputs::new()).unwrap();

        assert_eq!(outputs.len(), 1);
        let NodeOutput::Image(image) = &outputs[0];
        assert_eq!(image.shape(), [1, 480, 640, 3]);
        assert_eq!(node.source().state(), DeviceState::Open { device_id: 0 });
    }

    #[test]
    fn test_execute_surfaces_capture_errors() {
        let opener = MockOpener::new().with_device(0, MockDevice::default().failing_open());
        let mut node = node(opener);

        let result = node.execute(&NodeInputs::new());
        assert!(matches!(
            result,
            Err(NodeError::Capture(CaptureError::DeviceUnavailable { .. }))
        ));
        assert_eq!(node.stats().device_unavailable, 1);
    }

    #[test]
    fn test_registry_creates_nodes() {
        let mut registry = NodeRegistry::new();
        registry.register(WebcamCaptureNode::<MockOpener>::CLASS_NAME, || {
            Box::new(WebcamCaptureNode::with_config(
                MockOpener::new(),
                SourceConfig::immediate(),
            ))
        });

        assert_eq!(registry.class_names().collect::<Vec<_>>(), vec!["WebcamCapture"]);
        let mut node = registry.create("WebcamCapture").unwrap();
        assert!(node.execute(&NodeInputs::new()).is_ok());
        assert!(registry.create("Missing").is_none());
    }

    #[test]
    fn test_schema_serializes() {
        let node = node(MockOpener::new());
        let schema = NodeSchema::of(&node);

        assert_eq!(schema.inputs.len(), 10);
        assert_eq!(schema.cache_policy, CachePolicy::AlwaysRerun);

        let text = schema.to_toml().unwrap();
        assert!(text.contains("class_name = \"WebcamCapture\""));
        assert!(text.contains("cache_policy = \"AlwaysRerun\""));
        assert!(text.contains("name = \"seed\""));
        assert!(text.contains("type = \"UINT\""));
        assert!(text.contains("max = \"18446744073709551615\""));
        assert!(text.contains("type = \"FLOAT\""));
        assert!(text.contains("type = \"IMAGE\""));
    }
}
