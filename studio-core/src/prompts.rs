//! Instruction templates sent to the generative model.

/// Used when the caller gives no instruction for a render.
pub const DEFAULT_RENDER_INSTRUCTION: &str =
    "Strictly maintain structural adherence without adding elements.";

pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

const NO_TRAINING_INSTRUCTION: &str = "None provided.";

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Instruction for style extraction. Sent after the reference images.
pub fn extraction_prompt(training_instruction: Option<&str>) -> String {
    let custom = non_blank(training_instruction).unwrap_or(NO_TRAINING_INSTRUCTION);
    format!(
        r#"You are a senior art director and visual style analyst. Study the images above and write a detailed textual definition of the visual style they SHARE.

RULES:
1. IGNORE what the images depict. Do not mention subjects, objects, people or scenes.
2. DESCRIBE the exact color palette with specific color names, the lighting, the textures and surface detail, and the artistic technique or medium.
3. DO NOT invent glossy, glass, plastic or 3D rendering qualities unless every image is clearly dominated by them.
4. Give heavy weight to these custom instructions from the user: "{custom}"

Return ONLY the style description as raw text, written to be appended to an image generation prompt. Be concrete, dense and specific to how the images are executed."#
    )
}

/// Instruction for a render that redraws a reference image in the style.
pub fn image_conditioned_prompt(
    descriptor: &str,
    aspect_ratio: Option<&str>,
    instruction: Option<&str>,
) -> String {
    let aspect_ratio = non_blank(aspect_ratio).unwrap_or(DEFAULT_ASPECT_RATIO);
    let instruction = non_blank(instruction).unwrap_or(DEFAULT_RENDER_INSTRUCTION);
    format!(
        r#"You are a precise style transfer system. A reference image is attached.
Your only task is to REDRAW the exact subject and composition of the reference image, rendered entirely in the artistic style defined below.

STYLE DEFINITION:
{descriptor}

RULES:
1. KEEP the subject, layout and structure of the reference image. The reference image is the ground truth for what appears and where.
2. DO NOT introduce objects, people or elements that are absent from the reference image.
3. DO NOT add glossy, glass or 3D effects unless the style definition asks for them.
4. When the instruction below is "{DEFAULT_RENDER_INSTRUCTION}", change only colors, textures and technique; leave the geometry untouched.
5. Use the colors named in the style definition. Output aspect ratio: {aspect_ratio}.
6. Instruction: "{instruction}"
"#
    )
}

/// Instruction for a render synthesized from text alone.
pub fn text_only_prompt(
    descriptor: &str,
    aspect_ratio: Option<&str>,
    instruction: Option<&str>,
) -> String {
    let aspect_ratio = non_blank(aspect_ratio).unwrap_or(DEFAULT_ASPECT_RATIO);
    let instruction = non_blank(instruction).unwrap_or(DEFAULT_RENDER_INSTRUCTION);
    format!(
        r#"You are a precise image generation system. No reference image is provided.
Create a new image from scratch that follows the instruction below, executed entirely in the artistic style defined here.

STYLE DEFINITION:
{descriptor}

RULES:
1. Depict only what the instruction asks for. Do not add unrequested objects, people or text.
2. DO NOT add glossy, glass or 3D effects unless the style definition asks for them.
3. Use the colors named in the style definition. Output aspect ratio: {aspect_ratio}.
4. Instruction: "{instruction}"
"#
    )
}
