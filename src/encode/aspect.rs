//! Output geometry: target size, aspect flag, and scale/pad filters for
//! sources that fit neither the 4:3 nor the 16:9 family.

use setbox_core::{DeviceClass, DeviceProfile, SourceDescriptor};

const OPTIMIZED_WIDTHS: &[u32] = &[1920, 1440, 1280, 720, 704, 544, 480, 352];
const OPTIMIZED_HEIGHTS: &[u32] = &[1080, 720, 480];
const UHD_WIDTH: u32 = 3840;
const UHD_HEIGHT: u32 = 2160;

/// Reduced `width:height` ratios treated as 4:3 material.
const FOUR_THREE: &[(u32, u32)] = &[(4, 3), (10, 11), (15, 11), (59, 54), (59, 72), (59, 36)];
/// Reduced `width:height` ratios treated as 16:9 material.
const SIXTEEN_NINE: &[(u32, u32)] = &[(16, 9), (20, 11), (40, 33), (118, 81), (59, 27)];

/// Guards `floor` against products like 359.99999999999994.
const EPSILON: f64 = 1e-9;

pub fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Largest enumerated width and height at or below the source's.
///
/// Sources smaller than every enumerated value get the smallest one.
pub fn optimized_resolution(width: u32, height: u32, class: DeviceClass) -> (u32, u32) {
    let uhd = class == DeviceClass::UltraHighDefinition;
    let widths = uhd.then_some(UHD_WIDTH).into_iter().chain(OPTIMIZED_WIDTHS.iter().copied());
    let heights = uhd.then_some(UHD_HEIGHT).into_iter().chain(OPTIMIZED_HEIGHTS.iter().copied());
    (largest_at_most(widths, width), largest_at_most(heights, height))
}

fn largest_at_most(values: impl Iterator<Item = u32> + Clone, limit: u32) -> u32 {
    values
        .clone()
        .filter(|v| *v <= limit)
        .max()
        .or_else(|| values.min())
        .unwrap_or(limit)
}

/// Output size for `desc` on `profile`, before any padding.
pub fn target_size(desc: &SourceDescriptor, profile: &DeviceProfile) -> (u32, u32) {
    let (mut width, mut height) = (profile.width, profile.height);
    if profile.optimized_resolution {
        let (opt_width, opt_height) =
            optimized_resolution(desc.video_width, desc.video_height, profile.class);
        width = width.min(opt_width);
        height = height.min(opt_height);
    }
    (width, height)
}

/// Aspect, size and filter arguments for a re-encoded video stream.
pub fn aspect_args(desc: &SourceDescriptor, profile: &DeviceProfile) -> Vec<String> {
    let (width, height) = target_size(desc, profile);
    let (src_width, src_height) = (desc.video_width, desc.video_height);
    if src_width == 0 || src_height == 0 {
        return size_args("4:3", width, height);
    }
    let par = desc.pixel_aspect();
    let policy = profile.aspect;

    if profile.class.is_high_definition() && !profile.optimized_resolution && src_height <= height {
        // Keep the source size, squaring up the pixels. Widths stay even.
        return match desc.pixel_aspect_ratio {
            Some(p) if p.num < p.den => {
                let h = (u64::from(src_height) * u64::from(p.den)).div_ceil(u64::from(p.num));
                vec!["-s".into(), format!("{src_width}x{h}")]
            }
            Some(p) if p.num > p.den => {
                let w = (u64::from(src_width) * u64::from(p.num)).div_ceil(2 * u64::from(p.den)) * 2;
                vec!["-s".into(), format!("{w}x{src_height}")]
            }
            _ => Vec::new(),
        };
    }

    let d = gcd(src_width, src_height);
    let reduced = (src_width / d, src_height / d);
    let dar = desc.display_aspect_ratio.as_deref();
    let par_label = desc.pixel_aspect_ratio.map(|p| p.label());

    if reduced == (1, 1) && par_label.as_deref() == Some("8:9") {
        return size_args("4:3", width, height);
    }
    if FOUR_THREE.contains(&reduced) || dar == Some("4:3") {
        return size_args("4:3", width, height);
    }
    if (SIXTEEN_NINE.contains(&reduced) || dar == Some("16:9"))
        && (policy.allow_16x9 || policy.letterbox_16x9)
    {
        let aspect = if policy.blacklist_16x9 || (policy.allow_16x9 && policy.letterbox_16x9) {
            "4:3"
        } else {
            "16:9"
        };
        return size_args(aspect, width, height);
    }

    // Anything else is padded into the closest frame.
    let (w, h) = (f64::from(width), f64::from(height));
    let multiplier_16x9 = (16.0 * h) / (9.0 * w) / par;
    let multiplier_4x3 = (4.0 * h) / (3.0 * w) / par;
    let ratio = f64::from(src_width) * 100.0 * par / f64::from(src_height);
    tracing::debug!(par, ratio, multiplier_4x3, "padding source into frame");

    let (aspect, filter) = if ratio > 133.0 {
        if policy.allow_16x9 && ratio > 135.0 {
            let aspect = if policy.blacklist_16x9 || policy.letterbox_16x9 {
                "4:3"
            } else {
                "16:9"
            };
            let filter = if ratio > 177.0 {
                pad_top_bottom(width, height, multiplier_16x9, src_width, src_height)
            } else {
                pad_left_right(width, height, multiplier_16x9, src_width, src_height)
            };
            (aspect, filter)
        } else if ratio > 135.0 && policy.letterbox_16x9 {
            (
                "16:9",
                pad_top_bottom(width, height, multiplier_16x9, src_width, src_height),
            )
        } else {
            (
                "4:3",
                pad_top_bottom(width, height, multiplier_4x3, src_width, src_height),
            )
        }
    } else {
        (
            "4:3",
            pad_left_right(width, height, multiplier_4x3, src_width, src_height),
        )
    };

    vec!["-aspect".into(), aspect.into(), "-vf".into(), filter]
}

fn size_args(aspect: &str, width: u32, height: u32) -> Vec<String> {
    vec![
        "-aspect".into(),
        aspect.into(),
        "-s".into(),
        format!("{width}x{height}"),
    ]
}

fn round_down_even(v: i64) -> i64 {
    v - v.rem_euclid(2)
}

/// Scale to the full target width and pad above and below.
pub fn pad_top_bottom(
    width: u32,
    height: u32,
    multiplier: f64,
    src_width: u32,
    src_height: u32,
) -> String {
    let scaled =
        f64::from(width) * f64::from(src_height) / f64::from(src_width) * multiplier;
    let end_height = round_down_even((scaled + EPSILON).floor() as i64);
    let top = round_down_even((i64::from(height) - end_height) / 2);
    format!("scale={width}:{end_height},pad={width}:{height}:0:{top}")
}

/// Scale to the full target height and pad left and right.
pub fn pad_left_right(
    width: u32,
    height: u32,
    multiplier: f64,
    src_width: u32,
    src_height: u32,
) -> String {
    let scaled =
        f64::from(height) * f64::from(src_width) / (f64::from(src_height) * multiplier);
    let end_width = round_down_even((scaled + EPSILON).floor() as i64);
    let left = round_down_even((i64::from(width) - end_width) / 2);
    format!("scale={end_width}:{height},pad={width}:{height}:{left}:0")
}
