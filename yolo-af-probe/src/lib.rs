//! Runs the loss over synthetic predictions on an in-process rank group.

pub mod common;
pub mod config;
pub mod labels;
pub mod worker;

use crate::{common::*, config::Config, labels::LabelsFile, worker::StepReport};
use yolo_af::{LocalGroup, LossError};

/// The entry of the probe program. Returns the reports of rank 0.
pub async fn start(config: Arc<Config>) -> Result<Vec<StepReport>> {
    let labels = {
        let path = &config.input.labels_file;
        let labels = LabelsFile::open(path)
            .with_context(|| format!("failed to load labels file '{}'", path.display()))?;
        Arc::new(labels)
    };
    let world_size = config.distributed.world_size.get();
    info!(
        "start {} ranks over {} images",
        world_size,
        labels.images.len()
    );

    let workers = LocalGroup::new(world_size)?.into_iter().map(|member| {
        let config = config.clone();
        let labels = labels.clone();
        tokio::task::spawn_blocking(move || {
            let _span = tracing::info_span!("rank", rank = member.rank()).entered();
            run_rank_logged(&config, &labels, member)
        })
    });
    let mut reports = future::try_join_all(workers)
        .await?
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    Ok(reports.swap_remove(0))
}

fn run_rank_logged(
    config: &Config,
    labels: &LabelsFile,
    member: LocalGroup,
) -> Result<Vec<StepReport>> {
    let rank = member.rank();
    let result = worker::run_rank(config, labels, member);

    if let Err(err) = &result {
        match err.downcast_ref::<LossError>() {
            Some(LossError::NonFinite { breakdown }) => {
                error!("rank {} diverges, the loss breakdown is {}", rank, breakdown);
            }
            None => error!("rank {} fails: {:#}", rank, err),
        }
    }
    result
}
