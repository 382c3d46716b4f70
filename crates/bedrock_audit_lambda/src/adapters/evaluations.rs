use crate::runtime::contract::Evaluation;

pub trait EvaluationSink {
    fn put_evaluation(&self, result_token: &str, evaluation: &Evaluation) -> Result<(), String>;
}
