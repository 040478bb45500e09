// =============================================================================
// APC Model Container
// =============================================================================
//
// `ApcModel` pairs a validated table with the fit it produced:
//
//     table ──► design layout ──► design matrix ──► IRLS ──► FittedModel
//
// A model is an immutable value. Restricting it with `sub_model` filters the
// table and runs the whole pipeline again with the same family and
// predictor, returning a new, independent model; the parent is untouched.
// Sharing one model between several comparisons therefore needs no locking.
//
// =============================================================================

use std::fmt;

use ndarray::{Array1, Array2};

use crate::design::{DesignLayout, PredictorSpec};
use crate::diagnostics::{
    estimate_dispersion, estimate_dispersion_deviance, resid_deviance, resid_pearson,
    resid_response, resid_working,
};
use crate::error::Result;
use crate::families::Family;
use crate::index::{IndexRanges, ObservationTable, TimeScale};
use crate::inference::{coefficient_table, CoefficientRow};
use crate::solvers::{fit_glm_full, IRLSConfig};

// =============================================================================
// Restriction bounds
// =============================================================================

/// Inclusive bounds on exactly one time scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubRange {
    Age(i64, i64),
    Period(i64, i64),
    Cohort(i64, i64),
}

impl SubRange {
    pub fn scale(&self) -> TimeScale {
        match self {
            SubRange::Age(..) => TimeScale::Age,
            SubRange::Period(..) => TimeScale::Period,
            SubRange::Cohort(..) => TimeScale::Cohort,
        }
    }

    pub fn bounds(&self) -> (i64, i64) {
        match *self {
            SubRange::Age(from, to) | SubRange::Period(from, to) | SubRange::Cohort(from, to) => {
                (from, to)
            }
        }
    }
}

impl fmt::Display for SubRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (from, to) = self.bounds();
        write!(f, "{} {}..={}", self.scale(), from, to)
    }
}

// =============================================================================
// Fitted model
// =============================================================================

/// Everything estimated by one fit. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    pub coefficients: Array1<f64>,
    pub coefficient_names: Vec<String>,

    /// φ · (X'WX)⁻¹
    pub covariance: Array2<f64>,
    pub covariance_unscaled: Array2<f64>,

    /// Regressed quantity (log response for log-normal families, proportion
    /// for the binomial family).
    pub response: Array1<f64>,
    pub fitted_values: Array1<f64>,
    pub linear_predictor: Array1<f64>,
    pub prior_weights: Array1<f64>,

    pub deviance: f64,
    pub pearson_chi2: f64,
    pub dispersion: f64,
    /// D / (n - rank), whatever the family.
    pub dispersion_deviance: f64,

    pub rank: usize,
    pub df_resid: usize,
    pub n_obs: usize,
    pub iterations: usize,
}

impl FittedModel {
    /// √diag(covariance)
    pub fn std_errors(&self) -> Array1<f64> {
        self.covariance.diag().mapv(|v| v.max(0.0).sqrt())
    }
}

/// Residual flavours exposed by `ApcModel::residuals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualKind {
    Response,
    Pearson,
    Deviance,
    Working,
}

// =============================================================================
// Model container
// =============================================================================

/// A fitted APC model together with the data and specification behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApcModel {
    table: ObservationTable,
    family: Family,
    predictor: PredictorSpec,
    layout: DesignLayout,
    fitted: FittedModel,
    restrictions: Vec<SubRange>,
    config: IRLSConfig,
}

impl ApcModel {
    /// Fit `family` with `predictor` over the whole table.
    pub fn fit(table: ObservationTable, family: Family, predictor: PredictorSpec) -> Result<Self> {
        Self::fit_with_config(table, family, predictor, IRLSConfig::default())
    }

    /// As `fit`, with explicit IRLS settings. Sub-models inherit them.
    pub fn fit_with_config(
        table: ObservationTable,
        family: Family,
        predictor: PredictorSpec,
        config: IRLSConfig,
    ) -> Result<Self> {
        Self::fit_restricted(table, family, predictor, config, Vec::new())
    }

    fn fit_restricted(
        table: ObservationTable,
        family: Family,
        predictor: PredictorSpec,
        config: IRLSConfig,
        restrictions: Vec<SubRange>,
    ) -> Result<Self> {
        log::debug!(
            "fitting {} / {} on {} observations ({})",
            family,
            predictor,
            table.len(),
            table.ranges()
        );

        let data = family.working_data(&table)?;
        let layout = DesignLayout::new(table.ranges(), predictor)?;
        let design = layout.build(table.observations())?;

        let result = fit_glm_full(
            &data.y,
            &design.matrix,
            family,
            &config,
            data.offset.as_ref(),
            data.weights.as_ref(),
        )?;

        let dispersion = estimate_dispersion(result.pearson_chi2, result.df_resid, family);
        let fitted = FittedModel {
            covariance: &result.covariance_unscaled * dispersion,
            coefficients: result.coefficients,
            coefficient_names: design.names,
            covariance_unscaled: result.covariance_unscaled,
            response: data.y,
            fitted_values: result.fitted_values,
            linear_predictor: result.linear_predictor,
            prior_weights: result.prior_weights,
            deviance: result.deviance,
            pearson_chi2: result.pearson_chi2,
            dispersion,
            dispersion_deviance: estimate_dispersion_deviance(result.deviance, result.df_resid),
            rank: result.rank,
            df_resid: result.df_resid,
            n_obs: table.len(),
            iterations: result.iterations,
        };

        Ok(Self {
            table,
            family,
            predictor,
            layout,
            fitted,
            restrictions,
            config,
        })
    }

    /// Refit the same family and predictor on the observations inside `range`.
    ///
    /// Fails with `RangeError` for inverted bounds, bounds entirely outside
    /// this model's range on that scale, or an empty selection; bounds that
    /// overlap only partly are clipped. Fitting errors of the subset (too few
    /// levels, singular design) propagate unchanged.
    pub fn sub_model(&self, range: SubRange) -> Result<Self> {
        let (from, to) = range.bounds();
        let table = self.table.restrict(range.scale(), from, to)?;

        let mut restrictions = self.restrictions.clone();
        restrictions.push(range);

        Self::fit_restricted(table, self.family, self.predictor, self.config.clone(), restrictions)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn table(&self) -> &ObservationTable {
        &self.table
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn predictor(&self) -> PredictorSpec {
        self.predictor
    }

    pub fn ranges(&self) -> &IndexRanges {
        self.table.ranges()
    }

    pub fn layout(&self) -> &DesignLayout {
        &self.layout
    }

    /// Design column names, in coefficient order.
    pub fn column_names(&self) -> &[String] {
        &self.fitted.coefficient_names
    }

    pub fn fitted(&self) -> &FittedModel {
        &self.fitted
    }

    /// Restrictions applied since the unrestricted `fit`, oldest first.
    pub fn restrictions(&self) -> &[SubRange] {
        &self.restrictions
    }

    pub fn deviance(&self) -> f64 {
        self.fitted.deviance
    }

    pub fn df_resid(&self) -> usize {
        self.fitted.df_resid
    }

    pub fn dispersion(&self) -> f64 {
        self.fitted.dispersion
    }

    // =========================================================================
    // Inference and diagnostics
    // =========================================================================

    /// Coefficient summary; t-based for families with estimated dispersion.
    pub fn coefficient_table(&self, confidence: f64) -> Vec<CoefficientRow> {
        let df = self
            .family
            .estimates_dispersion()
            .then_some(self.fitted.df_resid as f64);
        coefficient_table(
            &self.fitted.coefficient_names,
            &self.fitted.coefficients,
            &self.fitted.covariance,
            df,
            confidence,
        )
    }

    pub fn residuals(&self, kind: ResidualKind) -> Array1<f64> {
        let f = &self.fitted;
        match kind {
            ResidualKind::Response => resid_response(&f.response, &f.fitted_values),
            ResidualKind::Pearson => {
                resid_pearson(&f.response, &f.fitted_values, &f.prior_weights, self.family)
            }
            ResidualKind::Deviance => {
                resid_deviance(&f.response, &f.fitted_values, &f.prior_weights, self.family)
            }
            ResidualKind::Working => resid_working(&f.response, &f.fitted_values, self.family),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
