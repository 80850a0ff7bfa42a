use kube::core::CustomResourceExt;
use lifecycle_operator::crd::{
    KeptnApp, KeptnAppVersion, KeptnConfig, KeptnEvaluation,
    KeptnEvaluationDefinition, KeptnTask, KeptnTaskDefinition, KeptnWorkload,
    KeptnWorkloadVersion,
};

fn main() -> anyhow::Result<()> {
    let crds = [
        KeptnApp::crd(),
        KeptnAppVersion::crd(),
        KeptnWorkload::crd(),
        KeptnWorkloadVersion::crd(),
        KeptnTask::crd(),
        KeptnTaskDefinition::crd(),
        KeptnEvaluation::crd(),
        KeptnEvaluationDefinition::crd(),
        KeptnConfig::crd(),
    ];
    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
