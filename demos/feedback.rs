//! Two passes with self-feedback: Buffer A reads its own previous frame to
//! build decaying paint trails under the mouse, and the image pass tone-maps
//! the accumulated buffer.
//!
//! Run with `cargo run --example feedback`.

use toyview::*;

const BUFFER_A: &str = r#"
void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 uv = fragCoord / iResolution.xy;

    // Previous frame, pulled slightly toward the centre and dimmed.
    vec2 drift = (uv - 0.5) * 0.002;
    vec3 previous = texture(iChannel0, uv - drift).rgb * 0.985;

    // Splat around the cursor while the button is down.
    vec3 splat = vec3(0.0);
    if (iMouse.z > 0.0) {
        float d = length(fragCoord - iMouse.xy) / iResolution.y;
        splat = vec3(0.9, 0.5, 0.2) * exp(-d * d * 900.0);
    }

    fragColor = vec4(previous + splat, 1.0);
}
"#;

const IMAGE: &str = r#"
void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 uv = fragCoord / iResolution.xy;
    vec3 trails = texture(iChannel0, uv).rgb;
    vec3 color = 1.0 - exp(-trails * 2.5);
    fragColor = vec4(color, 1.0);
}
"#;

fn main() {
    env_logger::init();

    let mut buffer_a = RenderPassSpec::new(PassType::Buffer, "buffer_a", BUFFER_A);
    buffer_a.outputs.push(OutputSpec {
        id: OUTPUT_ID_BUF_A,
        channel: 0,
    });
    buffer_a.inputs.push(InputSpec {
        id: OUTPUT_ID_BUF_A,
        src: String::new(),
        kind: InputKind::Buffer,
        channel: 0,
        sampler: SamplerSpec::default(),
    });

    let mut image = RenderPassSpec::new(PassType::Image, "image", IMAGE);
    image.outputs.push(OutputSpec {
        id: OUTPUT_ID_IMAGE,
        channel: 0,
    });
    image.inputs.push(InputSpec {
        id: OUTPUT_ID_BUF_A,
        src: String::new(),
        kind: InputKind::Buffer,
        channel: 0,
        sampler: SamplerSpec::default(),
    });

    run_with_config(
        AppConfig::new().title("Feedback Trails").size(1280, 720),
        ShaderDocument {
            name: "feedback".to_string(),
            passes: vec![buffer_a, image],
        },
    );
}
