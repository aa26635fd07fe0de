//! Held-out evaluation of a trained pathway model.

use crate::auc::{AucError, roc_auc};
use crate::cohort::Cohort;
use crate::trainer::{TrainError, TrainedPathwayModel};
use crate::types::ResultRow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error(transparent)]
    Prediction(#[from] TrainError),
    #[error("Test AUC for pathway '{pathway_id}' at sample size {sample_size} is undefined: {source}")]
    Auc {
        pathway_id: String,
        sample_size: usize,
        #[source]
        source: AucError,
    },
}

/// ROC-AUC of the model's Group2 probabilities on `test`.
pub fn test_auc(model: &TrainedPathwayModel, test: &Cohort) -> Result<f64, EvaluationError> {
    let probabilities = model.predict_probability(test)?;
    roc_auc(probabilities.view(), test.classes()).map_err(|source| EvaluationError::Auc {
        pathway_id: model.pathway_id().to_string(),
        sample_size: model.sample_size(),
        source,
    })
}

/// Scores `model` on `test` and assembles the result row for its pair.
pub fn evaluate(model: &TrainedPathwayModel, test: &Cohort) -> Result<ResultRow, EvaluationError> {
    let test_auc = test_auc(model, test)?;
    Ok(ResultRow {
        pathway_id: model.pathway_id().to_string(),
        sample_size: model.sample_size(),
        train_auc: model.cv_auc(),
        test_auc,
        n_train: model.n_train(),
        selected_lambda: model.selected_lambda(),
        genes_used: model.genes().len(),
    })
}
