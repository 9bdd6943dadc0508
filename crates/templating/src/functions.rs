//! Allow-listed SQL macros callable from templates.

/// Macro body: receives already-evaluated arguments.
pub type TemplateFn = Box<dyn Fn(&[String]) -> String + Send + Sync>;

pub struct TemplateFunction {
    pub arity: usize,
    pub apply: TemplateFn,
}

impl TemplateFunction {
    pub fn new(arity: usize, apply: impl Fn(&[String]) -> String + Send + Sync + 'static) -> Self {
        Self {
            arity,
            apply: Box::new(apply),
        }
    }
}

pub fn builtin_functions() -> Vec<(&'static str, TemplateFunction)> {
    vec![
        (
            "agg_sum",
            TemplateFunction::new(1, |args| format!("ifNull(sum({}), 0)", args[0])),
        ),
        (
            "agg_any",
            TemplateFunction::new(1, |args| format!("ifNull(max(toUInt8({})), 0)", args[0])),
        ),
        (
            "count_events",
            TemplateFunction::new(1, |args| format!("countIf({})", args[0])),
        ),
        ("agg_histogram_mean", TemplateFunction::new(1, |args| agg_histogram_mean(&args[0]))),
        (
            "histogram_normalized_sum",
            TemplateFunction::new(2, |args| histogram_normalized_sum(&args[0], &args[1])),
        ),
    ]
}

/// Histogram JSON (`{"values": {"<bucket>": <count>, ...}}`) as a bucket map.
fn histogram_values(histogram: &str) -> String {
    format!("JSONExtract({histogram}, 'values', 'Map(String, UInt64)')")
}

fn agg_histogram_mean(histogram: &str) -> String {
    let values = histogram_values(histogram);
    format!(
        "sum(arraySum((k, v) -> toInt64OrZero(k) * v, mapKeys({values}), mapValues({values})))\n    \
         / nullIf(sum(arraySum(mapValues({values}))), 0)"
    )
}

fn histogram_normalized_sum(histogram: &str, weight: &str) -> String {
    format!(
        "sum(arraySum(mapValues({})) * {weight})",
        histogram_values(histogram)
    )
}
