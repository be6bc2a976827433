use std::collections::BTreeMap;
use std::fmt;

use core_types::{CoreError, CoreResult, ProductCategory};
use serde::{Deserialize, Serialize};

/// Industry reference rates for one product category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CategoryBenchmark {
    pub avg_ctr: f64,
    pub avg_cvr: f64,
    pub top_10_percent_cvr: f64,
    pub top_1_percent_cvr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkConfig {
    pub default: CategoryBenchmark,
    pub categories: BTreeMap<ProductCategory, CategoryBenchmark>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        let bench = |avg_ctr, avg_cvr, top_10_percent_cvr, top_1_percent_cvr| CategoryBenchmark {
            avg_ctr,
            avg_cvr,
            top_10_percent_cvr,
            top_1_percent_cvr,
        };
        Self {
            default: bench(0.025, 0.08, 0.15, 0.25),
            categories: BTreeMap::from([
                (ProductCategory::LanguageLearning, bench(0.025, 0.08, 0.15, 0.25)),
                (ProductCategory::Fitness, bench(0.030, 0.10, 0.18, 0.30)),
                (ProductCategory::Finance, bench(0.020, 0.06, 0.12, 0.20)),
                (ProductCategory::Education, bench(0.028, 0.09, 0.16, 0.28)),
            ]),
        }
    }
}

impl BenchmarkConfig {
    /// Categories without their own table use the default one.
    pub fn resolve(&self, category: ProductCategory) -> &CategoryBenchmark {
        self.categories.get(&category).unwrap_or(&self.default)
    }

    pub(crate) fn validate(&self) -> CoreResult<()> {
        let tables = std::iter::once(("default".to_string(), &self.default))
            .chain(self.categories.iter().map(|(c, b)| (c.to_string(), b)));
        for (name, b) in tables {
            let rates = [b.avg_ctr, b.avg_cvr, b.top_10_percent_cvr, b.top_1_percent_cvr];
            if rates.iter().any(|r| !r.is_finite() || *r <= 0.0 || *r > 1.0) {
                return Err(CoreError::Config(format!(
                    "benchmarks.{name}: rates must lie in (0,1]"
                )));
            }
            if !(b.avg_cvr <= b.top_10_percent_cvr && b.top_10_percent_cvr <= b.top_1_percent_cvr) {
                return Err(CoreError::Config(format!(
                    "benchmarks.{name}: need avg_cvr <= top_10_percent_cvr <= top_1_percent_cvr"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkVerdict {
    BelowAverage,
    Average,
    Good,
    Excellent,
}

impl BenchmarkVerdict {
    /// Approximate percentile the verdict stands for.
    pub fn percentile(self) -> u8 {
        match self {
            Self::BelowAverage => 25,
            Self::Average => 50,
            Self::Good => 75,
            Self::Excellent => 95,
        }
    }
}

impl fmt::Display for BenchmarkVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::BelowAverage => "below average",
            Self::Average => "average",
            Self::Good => "good (above average)",
            Self::Excellent => "excellent (top 10%)",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkComparison {
    pub product_category: ProductCategory,
    pub cvr: f64,
    pub avg_cvr: f64,
    /// Relative distance to the category average, `0.3` is 30% above.
    pub cvr_vs_average: f64,
    pub cvr_percentile: u8,
    pub verdict: BenchmarkVerdict,
    pub ctr: Option<f64>,
    pub avg_ctr: f64,
    pub ctr_vs_average: Option<f64>,
}

/// Places an observed CVR (and optionally CTR) against the category table.
pub fn compare_to_benchmark(
    cfg: &BenchmarkConfig,
    category: ProductCategory,
    cvr: f64,
    ctr: Option<f64>,
) -> CoreResult<BenchmarkComparison> {
    for (field, value) in [("cvr", Some(cvr)), ("ctr", ctr)] {
        if let Some(v) = value {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(CoreError::validation(
                    field,
                    format!("expected a rate in [0,1], got {v}"),
                ));
            }
        }
    }

    let bench = cfg.resolve(category);
    let verdict = if cvr >= bench.top_10_percent_cvr {
        BenchmarkVerdict::Excellent
    } else if cvr >= bench.avg_cvr * 1.5 {
        BenchmarkVerdict::Good
    } else if cvr >= bench.avg_cvr {
        BenchmarkVerdict::Average
    } else {
        BenchmarkVerdict::BelowAverage
    };
    Ok(BenchmarkComparison {
        product_category: category,
        cvr,
        avg_cvr: bench.avg_cvr,
        cvr_vs_average: (cvr - bench.avg_cvr) / bench.avg_cvr,
        cvr_percentile: verdict.percentile(),
        verdict,
        ctr,
        avg_ctr: bench.avg_ctr,
        ctr_vs_average: ctr.map(|c| (c - bench.avg_ctr) / bench.avg_ctr),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_steps_with_cvr() {
        let cfg = BenchmarkConfig::default();
        let cat = ProductCategory::Fitness;
        let verdict = |cvr| {
            compare_to_benchmark(&cfg, cat, cvr, None)
                .expect("compare")
                .verdict
        };
        assert_eq!(verdict(0.05), BenchmarkVerdict::BelowAverage);
        assert_eq!(verdict(0.10), BenchmarkVerdict::Average);
        assert_eq!(verdict(0.15), BenchmarkVerdict::Good);
        assert_eq!(verdict(0.18), BenchmarkVerdict::Excellent);
    }

    #[test]
    fn comparison_reports_relative_distance() {
        let out = compare_to_benchmark(
            &BenchmarkConfig::default(),
            ProductCategory::Finance,
            0.09,
            Some(0.01),
        )
        .expect("compare");
        assert!((out.cvr_vs_average - 0.5).abs() < 1e-9);
        assert_eq!(out.verdict, BenchmarkVerdict::Good);
        assert_eq!(out.cvr_percentile, 75);
        assert!((out.ctr_vs_average.expect("ctr") + 0.5).abs() < 1e-9);
    }

    #[test]
    fn category_without_table_uses_default() {
        let cfg = BenchmarkConfig::default();
        assert_eq!(cfg.resolve(ProductCategory::Generic), &cfg.default);
        let out = compare_to_benchmark(&cfg, ProductCategory::Generic, 0.08, None).expect("compare");
        assert_eq!(out.avg_cvr, 0.08);
        assert_eq!(out.verdict, BenchmarkVerdict::Average);
        assert!(out.ctr_vs_average.is_none());
    }

    #[test]
    fn out_of_range_rates_are_rejected() {
        let cfg = BenchmarkConfig::default();
        let err = compare_to_benchmark(&cfg, ProductCategory::Fitness, 1.2, None)
            .expect_err("cvr above 1");
        assert!(matches!(err, CoreError::Validation { field: "cvr", .. }));
        let err = compare_to_benchmark(&cfg, ProductCategory::Fitness, 0.1, Some(f64::NAN))
            .expect_err("nan ctr");
        assert!(matches!(err, CoreError::Validation { field: "ctr", .. }));
    }

    #[test]
    fn inverted_benchmark_table_is_rejected() {
        let mut cfg = BenchmarkConfig::default();
        cfg.default.top_10_percent_cvr = 0.01;
        assert!(matches!(cfg.validate(), Err(CoreError::Config(_))));
        BenchmarkConfig::default().validate().expect("defaults are valid");
    }
}
