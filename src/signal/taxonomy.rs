//! Signal taxonomy (spec.md §6) - keys, expected value shape, and the
//! default confidence a well-behaved wave reports for each.
//!
//! These are documentation constants, not an enforced schema: a manifest's
//! `emits.on_complete[].confidence_range` is the actual enforced contract
//! (see `wave::manifest`).

pub const IDENTITY_SHA256: &str = "identity.sha256";
pub const IDENTITY_FORMAT: &str = "identity.format";
pub const IDENTITY_WIDTH: &str = "identity.width";
pub const IDENTITY_HEIGHT: &str = "identity.height";
pub const IDENTITY_ASPECT_RATIO: &str = "identity.aspect_ratio";

pub const COLOR_DOMINANT_NAMES: &str = "color.dominant_color_names";
pub const COLOR_DOMINANT_HEXES: &str = "color.dominant_color_hexes";
pub const COLOR_DOMINANT_PERCENTAGES: &str = "color.dominant_color_percentages";
pub const COLOR_MEAN_LUMINANCE: &str = "color.mean_luminance";
pub const COLOR_MEAN_SATURATION: &str = "color.mean_saturation";
pub const COLOR_IS_MOSTLY_GRAYSCALE: &str = "color.is_mostly_grayscale";
pub const COLOR_PALETTE: &str = "color.palette";

pub const QUALITY_EDGE_DENSITY: &str = "quality.edge_density";
pub const QUALITY_LUMINANCE_ENTROPY: &str = "quality.luminance_entropy";
pub const QUALITY_SHARPNESS: &str = "quality.sharpness";

pub const CONTENT_TYPE: &str = "content.type";
pub const CONTENT_TYPE_CONFIDENCE: &str = "content.type_confidence";
pub const CONTENT_TEXT_LIKELINESS: &str = "content.text_likeliness";
pub const CONTENT_LLM_CAPTION: &str = "content.llm_caption";
pub const CONTENT_EXTRACTED_TEXT: &str = "content.extracted_text";

pub const MOTION_DIRECTION: &str = "motion.direction";
pub const MOTION_MAGNITUDE: &str = "motion.magnitude";
pub const MOTION_PERCENTAGE: &str = "motion.percentage";

pub const COMPLEXITY_ANIMATION_TYPE: &str = "complexity.animation_type";
pub const COMPLEXITY_VISUAL_STABILITY: &str = "complexity.visual_stability";
pub const COMPLEXITY_COLOR_VARIATION: &str = "complexity.color_variation";
pub const COMPLEXITY_ENTROPY_VARIATION: &str = "complexity.entropy_variation";
pub const COMPLEXITY_OVERALL: &str = "complexity.overall";

pub const VISION_LLM_ERROR: &str = "vision.llm.error";

pub const VALIDATION_CONTRADICTION_COUNT: &str = "validation.contradiction.count";
pub const VALIDATION_CONTRADICTION_STATUS: &str = "validation.contradiction.status";

/// Content type as reported by the Type wave (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ContentType {
    Photo,
    Screenshot,
    Diagram,
    Chart,
    Icon,
    Artwork,
    Meme,
    ScannedDocument,
    #[default]
    Unknown,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Photo => "Photo",
            ContentType::Screenshot => "Screenshot",
            ContentType::Diagram => "Diagram",
            ContentType::Chart => "Chart",
            ContentType::Icon => "Icon",
            ContentType::Artwork => "Artwork",
            ContentType::Meme => "Meme",
            ContentType::ScannedDocument => "ScannedDocument",
            ContentType::Unknown => "Unknown",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Photo" => Ok(ContentType::Photo),
            "Screenshot" => Ok(ContentType::Screenshot),
            "Diagram" => Ok(ContentType::Diagram),
            "Chart" => Ok(ContentType::Chart),
            "Icon" => Ok(ContentType::Icon),
            "Artwork" => Ok(ContentType::Artwork),
            "Meme" => Ok(ContentType::Meme),
            "ScannedDocument" => Ok(ContentType::ScannedDocument),
            "Unknown" => Ok(ContentType::Unknown),
            other => Err(format!("unknown content type: {other}")),
        }
    }
}

/// Contradiction severity (spec.md §6, §9 precedence rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContradictionStatus {
    Clean,
    Info,
    Warning,
    Error,
    Critical,
}
