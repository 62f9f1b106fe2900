//! Color table text parser.
//!
//! Each meaningful line is `name: value`; anything after `;` is a comment.
//! Names are case-insensitive.

use tracing::{debug, warn};

use crate::color::Rgba;
use crate::error::{PaletteError, PaletteResult};
use crate::table::{Breakpoint, PaletteTable};

/// Channel layout of a color entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channels {
    /// `R G B`, alpha implied 255
    Rgb,
    /// `R G B A`
    Rgba,
}

impl Channels {
    fn width(self) -> usize {
        match self {
            Channels::Rgb => 3,
            Channels::Rgba => 4,
        }
    }
}

struct LineContext<'a> {
    source_name: &'a str,
    line: usize,
    content: &'a str,
}

impl LineContext<'_> {
    fn invalid(&self, value: &str, reason: impl Into<String>) -> PaletteError {
        PaletteError::InvalidValue {
            value: value.to_string(),
            reason: reason.into(),
            source_name: self.source_name.to_string(),
            line: self.line,
            content: self.content.to_string(),
        }
    }
}

pub(crate) fn parse_color_table(text: &str, source_name: &str) -> PaletteResult<PaletteTable> {
    let mut breakpoints = Vec::new();
    let mut scale = 1.0;
    let mut offset = 0.0;
    let mut step = None;
    let mut fallback = None;
    let mut product = None;
    let mut units = None;

    for (i, raw_line) in text.lines().enumerate() {
        let ctx = LineContext {
            source_name,
            line: i + 1,
            content: raw_line.trim_end(),
        };

        let content = raw_line.split(';').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let (name, value) = match content.split_once(':') {
            Some((name, value)) => (name.trim().to_lowercase(), value.trim()),
            None => (content.to_lowercase(), ""),
        };

        if value.is_empty() {
            warn!(
                table = source_name,
                line = ctx.line,
                content = raw_line,
                "Color table line has no value, skipping"
            );
            continue;
        }

        match name.as_str() {
            "product" => product = Some(value.to_string()),
            "units" => units = Some(value.to_string()),
            "decimals" => debug!(table = source_name, decimals = value, "Ignoring decimals"),
            "scale" => scale = parse_number(value, &ctx)?,
            "offset" => offset = parse_number(value, &ctx)?,
            "step" => step = Some(parse_number(value, &ctx)?),
            "rf" => fallback = Some(parse_rf(value, &ctx)?),
            "color" => breakpoints.push(parse_breakpoint(value, Channels::Rgb, true, &ctx)?),
            "color4" => breakpoints.push(parse_breakpoint(value, Channels::Rgba, true, &ctx)?),
            "solidcolor" => {
                let bp = parse_breakpoint(value, Channels::Rgb, false, &ctx)?;
                breakpoints.push(Breakpoint::dual(bp.value, bp.color, bp.color));
            }
            "solidcolor4" => {
                let bp = parse_breakpoint(value, Channels::Rgba, false, &ctx)?;
                breakpoints.push(Breakpoint::dual(bp.value, bp.color, bp.color));
            }
            _ => {
                return Err(PaletteError::UnknownName {
                    name,
                    source_name: source_name.to_string(),
                    line: ctx.line,
                    content: ctx.content.to_string(),
                })
            }
        }
    }

    let mut table = PaletteTable::with_transform(breakpoints, scale, offset);
    table.set_metadata(step, fallback, product, units);
    Ok(table)
}

fn parse_number(value: &str, ctx: &LineContext<'_>) -> PaletteResult<f64> {
    let n: f64 = value
        .parse()
        .map_err(|_| ctx.invalid(value, "expected a number"))?;
    if !n.is_finite() {
        return Err(ctx.invalid(value, "number must be finite"));
    }
    Ok(n)
}

fn parse_channel(part: &str, value: &str, ctx: &LineContext<'_>) -> PaletteResult<u8> {
    let n: i64 = part
        .parse()
        .map_err(|_| ctx.invalid(value, format!("'{}' is not an integer channel", part)))?;
    u8::try_from(n).map_err(|_| ctx.invalid(value, format!("channel {} outside 0-255", n)))
}

fn parse_color(parts: &[&str], value: &str, ctx: &LineContext<'_>) -> PaletteResult<Rgba> {
    let mut c = [0u8, 0, 0, 255];
    for (slot, part) in c.iter_mut().zip(parts) {
        *slot = parse_channel(part, value, ctx)?;
    }
    Ok(Rgba::from(c))
}

/// `RF:` takes 3 or 4 channels with no value field.
fn parse_rf(value: &str, ctx: &LineContext<'_>) -> PaletteResult<Rgba> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    match parts.len() {
        3 | 4 => parse_color(&parts, value, ctx),
        n => Err(ctx.invalid(value, format!("expected 3 or 4 channels, got {}", n))),
    }
}

/// `value R G B [R G B]` or `value R G B A [R G B A]`.
fn parse_breakpoint(
    value: &str,
    channels: Channels,
    allow_dual: bool,
    ctx: &LineContext<'_>,
) -> PaletteResult<Breakpoint> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    let width = channels.width();

    let dual = if parts.len() == 1 + width {
        false
    } else if allow_dual && parts.len() == 1 + 2 * width {
        true
    } else {
        let expected = if allow_dual {
            format!("{} or {}", 1 + width, 1 + 2 * width)
        } else {
            (1 + width).to_string()
        };
        return Err(ctx.invalid(
            value,
            format!("expected {} fields, got {}", expected, parts.len()),
        ));
    };

    let at = parse_number(parts[0], ctx)?;
    let color = parse_color(&parts[1..1 + width], value, ctx)?;

    if dual {
        let secondary = parse_color(&parts[1 + width..], value, ctx)?;
        Ok(Breakpoint::dual(at, color, secondary))
    } else {
        Ok(Breakpoint::new(at, color))
    }
}
