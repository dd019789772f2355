//! Single image pass: an animated plasma driven by `iTime` and `iMouse`.
//!
//! Run with `cargo run --example plasma`.

use toyview::*;

const PLASMA: &str = r#"
void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 uv = (fragCoord * 2.0 - iResolution.xy) / iResolution.y;
    vec2 m = (iMouse.xy * 2.0 - iResolution.xy) / iResolution.y;

    float v = sin(uv.x * 6.0 + iTime);
    v += sin((uv.y + iTime) * 4.0);
    v += sin((uv.x + uv.y + sin(iTime * 0.5)) * 5.0);
    v += sin(length(uv - m) * 9.0 - iTime * 2.0);

    vec3 color = 0.5 + 0.5 * cos(v + vec3(0.0, 2.1, 4.2));
    fragColor = vec4(color, 1.0);
}
"#;

fn main() {
    env_logger::init();

    let mut image = RenderPassSpec::new(PassType::Image, "image", PLASMA);
    image.outputs.push(OutputSpec {
        id: OUTPUT_ID_IMAGE,
        channel: 0,
    });

    run_with_config(
        AppConfig::new().title("Plasma").size(1280, 720),
        ShaderDocument {
            name: "plasma".to_string(),
            passes: vec![image],
        },
    );
}
