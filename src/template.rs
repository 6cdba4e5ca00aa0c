//! The oscillator loop, written in the mini-language and rendered with the
//! one runtime parameter it takes.
//!
//! Template text refers to bindings through `{{role}}` placeholders (see
//! [`crate::schema`]); `{{ratio}}` is the table-size-over-sample-rate ratio.

use crate::error::{Error, Result};
use crate::schema::Bindings;

/// What the loop stores into each output sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopBody {
    /// `output[i] = sine[i]`
    #[default]
    Copy,
    /// `output[i] = sine[i] * tableDelta`
    Scaled,
}

/// Which fixed element the program's `result` binding reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    Sine(usize),
    Output(usize),
}

impl Default for ResultSource {
    fn default() -> Self {
        ResultSource::Sine(0)
    }
}

/// Shape of the generated loop and its exit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemplateVariant {
    pub body: LoopBody,
    pub result: ResultSource,
    /// End the template with `return output[0]`. The assembler's own
    /// `result`/`return` still follow it.
    pub inline_return: bool,
}

const PROLOGUE: &str = "
{{tableDelta}} = {{freq}} * {{ratio}};
{{currentIndex}} = 0;
{{i}} = 0;
while {{i}} != {{N}} {
  {{output}}[{{i}}] = ";

const COPY_VALUE: &str = "{{sine}}[{{i}}]";
const SCALED_VALUE: &str = "{{sine}}[{{i}}] * {{tableDelta}}";

const EPILOGUE: &str = "; {{i}} = {{i}} + 1
}
";

const INLINE_RETURN: &str = "return {{output}}[0]
";

/// A loop template bound to a naming schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopTemplate {
    source: String,
    bindings: Bindings,
}

impl LoopTemplate {
    /// Wrap arbitrary template text.
    pub fn new(source: impl Into<String>, bindings: Bindings) -> Self {
        LoopTemplate {
            source: source.into(),
            bindings,
        }
    }

    /// The oscillator loop for `variant`.
    pub fn for_variant(variant: &TemplateVariant, bindings: Bindings) -> Self {
        let value = match variant.body {
            LoopBody::Copy => COPY_VALUE,
            LoopBody::Scaled => SCALED_VALUE,
        };
        let mut source = String::with_capacity(PROLOGUE.len() + 64);
        source.push_str(PROLOGUE);
        source.push_str(value);
        source.push_str(EPILOGUE);
        if variant.inline_return {
            source.push_str(INLINE_RETURN);
        }
        LoopTemplate { source, bindings }
    }

    /// Unrendered template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Substitute every placeholder. Pure in `ratio`.
    pub fn render(&self, ratio: f64) -> Result<String> {
        let ratio = format_ratio(ratio)?;
        let mut out = String::with_capacity(self.source.len() + ratio.len());
        let mut rest = self.source.as_str();
        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                Error::TemplateRender(format!(
                    "unterminated placeholder at byte {}",
                    self.source.len() - rest.len() + open
                ))
            })?;
            let key = after[..close].trim();
            if key == "ratio" {
                out.push_str(&ratio);
            } else {
                let name = self.bindings.get(key).ok_or_else(|| {
                    Error::TemplateRender(format!("unknown placeholder `{{{{{key}}}}}`"))
                })?;
                out.push_str(name);
            }
            rest = &after[close + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Render `ratio` so the mini-language always lexes it as a float literal.
fn format_ratio(ratio: f64) -> Result<String> {
    if !ratio.is_finite() || ratio < 0.0 {
        return Err(Error::TemplateRender(format!(
            "ratio must be finite and non-negative, got {ratio}"
        )));
    }
    // Debug keeps a `.` or an exponent on every value, e.g. `1.0`, `1e-7`.
    Ok(format!("{ratio:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_template() -> LoopTemplate {
        LoopTemplate::for_variant(&TemplateVariant::default(), Bindings::STANDARD)
    }

    #[test]
    fn renders_copy_loop() {
        let text = copy_template().render(0.25).unwrap();
        assert_eq!(
            text,
            "\ntableDelta = freq * 0.25;\ncurrentIndex = 0;\ni = 0;\nwhile i != N {\n  output[i] = sine[i]; i = i + 1\n}\n"
        );
    }

    #[test]
    fn renders_scaled_loop_with_return() {
        let variant = TemplateVariant {
            body: LoopBody::Scaled,
            inline_return: true,
            ..Default::default()
        };
        let text = LoopTemplate::for_variant(&variant, Bindings::STANDARD)
            .render(1.0)
            .unwrap();
        assert!(text.contains("tableDelta = freq * 1.0;"));
        assert!(text.contains("output[i] = sine[i] * tableDelta;"));
        assert!(text.ends_with("return output[0]\n"));
    }

    #[test]
    fn render_is_pure() {
        let t = copy_template();
        let ratio = 12.0 / 44100.0;
        assert_eq!(t.render(ratio).unwrap(), t.render(ratio).unwrap());
        assert_ne!(t.render(ratio).unwrap(), t.render(ratio * 2.0).unwrap());
    }

    #[test]
    fn renamed_bindings_flow_through() {
        let b = Bindings {
            output: "buf",
            counter: "k",
            ..Bindings::STANDARD
        };
        let text = LoopTemplate::for_variant(&TemplateVariant::default(), b)
            .render(0.5)
            .unwrap();
        assert!(text.contains("while k != N {"));
        assert!(text.contains("buf[k] = sine[k]; k = k + 1"));
        assert!(!text.contains("output"));
    }

    #[test]
    fn malformed_templates() {
        let unknown = LoopTemplate::new("x = {{bogus}}", Bindings::STANDARD);
        assert!(matches!(unknown.render(1.0), Err(Error::TemplateRender(_))));

        let open = LoopTemplate::new("x = {{ratio", Bindings::STANDARD);
        assert!(matches!(open.render(1.0), Err(Error::TemplateRender(_))));
    }

    #[test]
    fn rejects_unrepresentable_ratios() {
        let t = copy_template();
        for r in [f64::NAN, f64::INFINITY, -0.5] {
            assert!(matches!(t.render(r), Err(Error::TemplateRender(_))));
        }
    }

    #[test]
    fn ratio_always_has_a_point_or_exponent() {
        assert_eq!(format_ratio(1.0).unwrap(), "1.0");
        let tiny = format_ratio(1e-9).unwrap();
        assert!(tiny.contains('e'), "{tiny}");
    }
}
