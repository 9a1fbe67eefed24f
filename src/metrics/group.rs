use crate::core::model::Run;

/// Runs sharing a stage-type, in their original order.
#[derive(Debug, Clone)]
pub struct StageGroup<'a> {
    pub stage_type: String,
    pub runs: Vec<&'a Run>,
}

/// Groups runs by stage-type. Groups appear in first-seen order.
pub fn group_by_stage_type(runs: &[Run]) -> Vec<StageGroup<'_>> {
    let mut groups: Vec<StageGroup<'_>> = Vec::new();
    for run in runs {
        let stage_type = run.stage_id().stage_type;
        match groups.iter_mut().find(|group| group.stage_type == stage_type) {
            Some(group) => group.runs.push(run),
            None => groups.push(StageGroup {
                stage_type,
                runs: vec![run],
            }),
        }
    }
    groups
}

/// Runs of one stage-type, in their original order.
pub fn runs_of_type<'a>(runs: &'a [Run], stage_type: &str) -> Vec<&'a Run> {
    runs.iter()
        .filter(|run| run.stage_id().is_type(stage_type))
        .collect()
}
