//! The ShaderToy document model consumed by the render graph.
//!
//! A [`ShaderDocument`] is the parsed form of a ShaderToy JSON file: an
//! ordered list of render passes, each with up to four channel inputs and an
//! output ID. Parsing itself is a collaborator concern; this module only
//! defines the data model, the topology rules the resolver relies on, and a
//! small built-in document for demos and tests.

use thiserror::Error;

/// Maximum number of channel inputs per pass.
pub const MAX_INPUTS: usize = 4;

/// Maximum number of feedback buffer passes in a document.
pub const MAX_BUFFER_PASSES: usize = 4;

// Output IDs ShaderToy assigns to the standard passes. The common pass
// produces no output and so has no ID.
pub const OUTPUT_ID_IMAGE: i32 = 37;
pub const OUTPUT_ID_SOUND: i32 = 38;
pub const OUTPUT_ID_CUBE_A: i32 = 41;
pub const OUTPUT_ID_BUF_A: i32 = 257;
pub const OUTPUT_ID_BUF_B: i32 = 258;
pub const OUTPUT_ID_BUF_C: i32 = 259;
pub const OUTPUT_ID_BUF_D: i32 = 260;

/// The role a render pass plays in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    /// The single final pass whose output is displayed.
    Image,
    /// A feedback-capable intermediate pass (ShaderToy "Buffer A–D").
    Buffer,
    /// A cubemap-producing pass.
    Cubemap,
    /// An audio-producing pass; not part of the visual graph.
    Sound,
    /// Shared source text prepended to every other pass; has no output.
    Common,
}

/// What a channel input reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// The output of another pass in the same document.
    Buffer,
    /// A static 2D image asset.
    Texture,
    /// A static cubemap asset (six image files).
    Cubemap,
    /// A video stream decoded by a collaborator.
    Video,
    /// The webcam stream.
    Webcam,
    /// An audio stream rendered to a 512x2 waveform/FFT texture.
    Audio,
    /// The shared 256x3 keyboard-state texture.
    Keyboard,
}

/// Texture filtering requested for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
    /// Trilinear with mipmaps. Pass buffers and streaming textures carry a
    /// single mip level, so this degrades to linear for them.
    Mipmap,
}

/// Texture addressing requested for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
}

/// Per-channel sampler settings from the document.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerSpec {
    pub filter: FilterMode,
    pub wrap: WrapMode,
    /// Flip the asset vertically on load.
    pub vflip: bool,
    /// Decode the asset as sRGB.
    pub srgb: bool,
}

/// One channel input of a render pass.
#[derive(Debug, Clone)]
pub struct InputSpec {
    /// Asset or source-pass identifier. For [`InputKind::Buffer`] this is the
    /// output ID of the referenced pass.
    pub id: i32,
    /// Source location for loadable assets (file path or URL).
    pub src: String,
    pub kind: InputKind,
    /// Channel index in 0..4.
    pub channel: usize,
    pub sampler: SamplerSpec,
}

/// The output binding of a render pass.
#[derive(Debug, Clone, Copy)]
pub struct OutputSpec {
    pub id: i32,
    pub channel: usize,
}

/// One render pass as declared by the document.
#[derive(Debug, Clone)]
pub struct RenderPassSpec {
    pub pass_type: PassType,
    pub name: String,
    /// The pass's GLSL source (the body containing `mainImage`).
    pub code: String,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
}

impl RenderPassSpec {
    /// A pass with no inputs and a single output.
    pub fn new(pass_type: PassType, name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            pass_type,
            name: name.into(),
            code: code.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Returns this pass's primary output ID, if it has one.
    pub fn output_id(&self) -> Option<i32> {
        self.outputs.first().map(|o| o.id)
    }
}

/// Why a document cannot be resolved into a graph.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document has no image pass")]
    MissingImagePass,
    #[error("document has {0} image passes, expected exactly one")]
    MultipleImagePasses(usize),
    #[error("document has {0} buffer passes, at most {MAX_BUFFER_PASSES} are allowed")]
    TooManyBufferPasses(usize),
    #[error("document has {count} {pass_type:?} passes, at most one is allowed")]
    DuplicatePass { pass_type: PassType, count: usize },
    #[error("pass '{pass}' has {count} inputs, at most {MAX_INPUTS} are allowed")]
    TooManyInputs { pass: String, count: usize },
    #[error("pass '{pass}' input channel {channel} is out of range")]
    ChannelOutOfRange { pass: String, channel: usize },
}

/// A complete parsed ShaderToy document.
///
/// The pass list preserves document order, which matters: buffer passes
/// execute in the order they are declared.
#[derive(Debug, Clone, Default)]
pub struct ShaderDocument {
    pub name: String,
    pub passes: Vec<RenderPassSpec>,
}

impl ShaderDocument {
    /// Checks the fixed ShaderToy topology rules: exactly one image pass, at
    /// most four buffer passes, at most one each of cubemap, sound and
    /// common, and per-pass input limits.
    pub fn validate(&self) -> Result<(), DocumentError> {
        let images = self.count_passes_by_type(PassType::Image);
        if images == 0 {
            return Err(DocumentError::MissingImagePass);
        }
        if images > 1 {
            return Err(DocumentError::MultipleImagePasses(images));
        }

        let buffers = self.count_passes_by_type(PassType::Buffer);
        if buffers > MAX_BUFFER_PASSES {
            return Err(DocumentError::TooManyBufferPasses(buffers));
        }

        for pass_type in [PassType::Cubemap, PassType::Sound, PassType::Common] {
            let count = self.count_passes_by_type(pass_type);
            if count > 1 {
                return Err(DocumentError::DuplicatePass { pass_type, count });
            }
        }

        for pass in &self.passes {
            if pass.inputs.len() > MAX_INPUTS {
                return Err(DocumentError::TooManyInputs {
                    pass: pass.name.clone(),
                    count: pass.inputs.len(),
                });
            }
            for input in &pass.inputs {
                if input.channel >= MAX_INPUTS {
                    return Err(DocumentError::ChannelOutOfRange {
                        pass: pass.name.clone(),
                        channel: input.channel,
                    });
                }
            }
        }

        Ok(())
    }

    /// Index of the pass that produces `output_id`, if any.
    pub fn find_pass_by_output_id(&self, output_id: i32) -> Option<usize> {
        self.passes
            .iter()
            .position(|p| p.outputs.iter().any(|o| o.id == output_id))
    }

    /// Index of the first pass of the given type at or after `start`.
    pub fn find_pass_by_type(&self, pass_type: PassType, start: usize) -> Option<usize> {
        self.passes
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, p)| p.pass_type == pass_type)
            .map(|(i, _)| i)
    }

    pub fn count_passes_by_type(&self, pass_type: PassType) -> usize {
        self.passes
            .iter()
            .filter(|p| p.pass_type == pass_type)
            .count()
    }

    /// The source of the common pass, if the document has one.
    pub fn common_source(&self) -> Option<&str> {
        self.find_pass_by_type(PassType::Common, 0)
            .map(|i| self.passes[i].code.as_str())
    }

    /// A small single-pass document used when nothing has been loaded yet.
    pub fn default_document() -> Self {
        let mut image = RenderPassSpec::new(
            PassType::Image,
            "Image",
            "void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n\
             \x20 vec2 uv = fragCoord / iResolution.xy;\n\
             \x20 vec3 col = 0.5 + 0.5 * cos(iTime + uv.xyx + vec3(0.0, 2.0, 4.0));\n\
             \x20 fragColor = vec4(col, 1.0);\n\
             }\n",
        );
        image.outputs.push(OutputSpec {
            id: OUTPUT_ID_IMAGE,
            channel: 0,
        });
        Self {
            name: "default".to_string(),
            passes: vec![image],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass_with_output(pass_type: PassType, id: i32) -> RenderPassSpec {
        let mut pass = RenderPassSpec::new(pass_type, format!("{pass_type:?}"), "");
        pass.outputs.push(OutputSpec { id, channel: 0 });
        pass
    }

    #[test]
    fn default_document_is_valid() {
        let doc = ShaderDocument::default_document();
        assert!(doc.validate().is_ok());
        assert_eq!(doc.count_passes_by_type(PassType::Image), 1);
    }

    #[test]
    fn missing_image_pass_is_rejected() {
        let doc = ShaderDocument {
            name: "bad".into(),
            passes: vec![pass_with_output(PassType::Buffer, OUTPUT_ID_BUF_A)],
        };
        assert!(matches!(
            doc.validate(),
            Err(DocumentError::MissingImagePass)
        ));
    }

    #[test]
    fn five_buffer_passes_are_rejected() {
        let mut passes: Vec<_> = (0..5)
            .map(|i| pass_with_output(PassType::Buffer, OUTPUT_ID_BUF_A + i))
            .collect();
        passes.push(pass_with_output(PassType::Image, OUTPUT_ID_IMAGE));
        let doc = ShaderDocument {
            name: "bad".into(),
            passes,
        };
        assert!(matches!(
            doc.validate(),
            Err(DocumentError::TooManyBufferPasses(5))
        ));
    }

    #[test]
    fn duplicate_common_pass_is_rejected() {
        let doc = ShaderDocument {
            name: "bad".into(),
            passes: vec![
                RenderPassSpec::new(PassType::Common, "Common", ""),
                RenderPassSpec::new(PassType::Common, "Common", ""),
                pass_with_output(PassType::Image, OUTPUT_ID_IMAGE),
            ],
        };
        assert!(matches!(
            doc.validate(),
            Err(DocumentError::DuplicatePass {
                pass_type: PassType::Common,
                count: 2
            })
        ));
    }

    #[test]
    fn output_id_lookup_finds_declared_pass() {
        let doc = ShaderDocument {
            name: "doc".into(),
            passes: vec![
                pass_with_output(PassType::Buffer, OUTPUT_ID_BUF_A),
                pass_with_output(PassType::Image, OUTPUT_ID_IMAGE),
            ],
        };
        assert_eq!(doc.find_pass_by_output_id(OUTPUT_ID_BUF_A), Some(0));
        assert_eq!(doc.find_pass_by_output_id(OUTPUT_ID_IMAGE), Some(1));
        assert_eq!(doc.find_pass_by_output_id(OUTPUT_ID_BUF_D), None);
    }

    #[test]
    fn out_of_range_channel_is_rejected() {
        let mut image = pass_with_output(PassType::Image, OUTPUT_ID_IMAGE);
        image.inputs.push(InputSpec {
            id: 0,
            src: String::new(),
            kind: InputKind::Keyboard,
            channel: 4,
            sampler: SamplerSpec::default(),
        });
        let doc = ShaderDocument {
            name: "bad".into(),
            passes: vec![image],
        };
        assert!(matches!(
            doc.validate(),
            Err(DocumentError::ChannelOutOfRange { channel: 4, .. })
        ));
    }
}
