//! Per-provider image token accounting.
//!
//! Each provider family prices image input differently; these formulas feed
//! the evidence engine's budget math and the facade's token estimates.

use crate::types::{ContentPart, Message, normalize_dimension};

/// Hard cap applied to each dimension before any provider formula runs.
const DIMENSION_CAP: f64 = 8192.0;

/// Anthropic downscales images above ~1.15 megapixels.
const ANTHROPIC_MAX_PIXELS: f64 = 1_150_000.0;

/// Provider family for image token pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTokenFamily {
    /// Anthropic Messages pricing (pixels / 750).
    Anthropic,
    /// OpenAI tile-based pricing.
    OpenAi,
    /// Gemini flat pricing.
    Gemini,
    /// Unknown provider: budget for the worst case.
    Unknown,
}

/// OpenAI image detail setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageDetail {
    /// Fixed low-resolution cost.
    Low,
    /// Tile-based high-resolution cost.
    High,
    /// Low when the longest side fits in one tile, high otherwise.
    #[default]
    Auto,
}

/// Tokens one image contributes to the input budget.
///
/// Dimensions default to 1024, are clamped into `[1, 16384]`, then capped at
/// 8192 before the provider formula applies.
#[must_use]
pub fn image_tokens(
    family: ImageTokenFamily,
    width: Option<f64>,
    height: Option<f64>,
    detail: ImageDetail,
) -> u64 {
    let w = normalize_dimension(width).min(DIMENSION_CAP);
    let h = normalize_dimension(height).min(DIMENSION_CAP);
    match family {
        ImageTokenFamily::Anthropic => anthropic_tokens(w, h),
        ImageTokenFamily::OpenAi => openai_tokens(w, h, detail),
        ImageTokenFamily::Gemini => 258,
        ImageTokenFamily::Unknown => anthropic_tokens(w, h)
            .max(openai_tokens(w, h, detail))
            .max(258),
    }
}

fn anthropic_tokens(mut w: f64, mut h: f64) -> u64 {
    if w * h > ANTHROPIC_MAX_PIXELS {
        let scale = (ANTHROPIC_MAX_PIXELS / (w * h)).sqrt();
        w *= scale;
        h *= scale;
    }
    ((w * h / 750.0).ceil() as u64).max(1)
}

fn openai_tokens(w: f64, h: f64, detail: ImageDetail) -> u64 {
    let effective = match detail {
        ImageDetail::Low => return 85,
        ImageDetail::High => ImageDetail::High,
        ImageDetail::Auto => {
            if w.max(h) <= 512.0 {
                return 85;
            }
            ImageDetail::High
        }
    };
    debug_assert!(matches!(effective, ImageDetail::High));

    let (mut w, mut h) = (w, h);
    let longest = w.max(h);
    if longest > 2048.0 {
        let scale = 2048.0 / longest;
        w *= scale;
        h *= scale;
    }
    let shortest = w.min(h);
    if shortest > 768.0 {
        let scale = 768.0 / shortest;
        w *= scale;
        h *= scale;
    }
    let tiles = (w / 512.0).ceil() * (h / 512.0).ceil();
    85 + 170 * tiles as u64
}

/// Sum of image token contributions across a message's content.
///
/// Non-image content is priced by the provider's text tokenizer, not here.
#[must_use]
pub fn message_image_tokens(message: &Message, family: ImageTokenFamily, detail: ImageDetail) -> u64 {
    message
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Image { width, height, .. } => {
                Some(image_tokens(family, *width, *height, detail))
            }
            _ => None,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageSource, Role};

    #[test]
    fn gemini_is_flat_258() {
        assert_eq!(
            image_tokens(ImageTokenFamily::Gemini, Some(1920.0), Some(1080.0), ImageDetail::Auto),
            258
        );
        assert_eq!(
            image_tokens(ImageTokenFamily::Gemini, None, None, ImageDetail::Auto),
            258
        );
    }

    #[test]
    fn openai_low_detail_is_85() {
        assert_eq!(
            image_tokens(ImageTokenFamily::OpenAi, Some(4096.0), Some(4096.0), ImageDetail::Low),
            85
        );
    }

    #[test]
    fn openai_high_detail_1920_1080() {
        // 1080 > 768 scales to 1365.33x768; tiles = 3 * 2.
        assert_eq!(
            image_tokens(ImageTokenFamily::OpenAi, Some(1920.0), Some(1080.0), ImageDetail::High),
            85 + 170 * 6
        );
    }

    #[test]
    fn openai_auto_small_image_is_low() {
        assert_eq!(
            image_tokens(ImageTokenFamily::OpenAi, Some(512.0), Some(512.0), ImageDetail::Auto),
            85
        );
        assert_ne!(
            image_tokens(ImageTokenFamily::OpenAi, Some(513.0), Some(513.0), ImageDetail::Auto),
            85
        );
    }

    #[test]
    fn openai_high_scales_longest_side_first() {
        // 4096x1024: longest scales to 2048x512, shortest fits. Tiles = 4x1.
        assert_eq!(
            image_tokens(ImageTokenFamily::OpenAi, Some(4096.0), Some(1024.0), ImageDetail::High),
            85 + 170 * 4
        );
    }

    #[test]
    fn anthropic_small_image_floor_is_one() {
        assert_eq!(
            image_tokens(ImageTokenFamily::Anthropic, Some(1.0), Some(1.0), ImageDetail::Auto),
            1
        );
    }

    #[test]
    fn anthropic_1024_square() {
        // 1024*1024 = 1048576 pixels, under the megapixel cap: ceil(/750) = 1399.
        assert_eq!(
            image_tokens(ImageTokenFamily::Anthropic, Some(1024.0), Some(1024.0), ImageDetail::Auto),
            1399
        );
    }

    #[test]
    fn anthropic_huge_image_is_capped_then_scaled() {
        // 10000x10000 caps to 8192x8192, then megapixel scaling brings the
        // pixel count to ~1.15e6: tokens land near 1534, far below the
        // uncapped ceil(8192*8192/750).
        let tokens =
            image_tokens(ImageTokenFamily::Anthropic, Some(10_000.0), Some(10_000.0), ImageDetail::Auto);
        assert!(tokens <= 1_534, "tokens = {tokens}");
        assert!(tokens >= 1_500, "tokens = {tokens}");
    }

    #[test]
    fn unknown_family_takes_the_max() {
        let w = Some(1920.0);
        let h = Some(1080.0);
        let expected = image_tokens(ImageTokenFamily::Anthropic, w, h, ImageDetail::Auto)
            .max(image_tokens(ImageTokenFamily::OpenAi, w, h, ImageDetail::Auto))
            .max(258);
        assert_eq!(
            image_tokens(ImageTokenFamily::Unknown, w, h, ImageDetail::Auto),
            expected
        );
    }

    #[test]
    fn message_image_tokens_sums_images_only() {
        let msg = Message::new(
            Role::User,
            vec![
                ContentPart::Text {
                    text: "two screenshots".into(),
                },
                ContentPart::Image {
                    source: ImageSource::Url {
                        url: "https://example.com/a.png".into(),
                    },
                    media_type: "image/png".into(),
                    width: Some(1920.0),
                    height: Some(1080.0),
                },
                ContentPart::Image {
                    source: ImageSource::Url {
                        url: "https://example.com/b.png".into(),
                    },
                    media_type: "image/png".into(),
                    width: Some(100.0),
                    height: Some(100.0),
                },
            ],
        );
        assert_eq!(
            message_image_tokens(&msg, ImageTokenFamily::Gemini, ImageDetail::Auto),
            258 * 2
        );
    }
}
