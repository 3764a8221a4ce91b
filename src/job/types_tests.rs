//! Tests for job value types

#[cfg(test)]
mod types_tests {
    use super::super::*;
    use std::time::Duration;

    #[test]
    fn test_instance_status_is_success() {
        assert!(InstanceStatus::Succeeded.is_success());
        assert!(
            !InstanceStatus::Failed {
                exit_code: 1,
                command_index: 0
            }
            .is_success()
        );
        assert!(
            !InstanceStatus::TimedOut {
                after: Duration::from_secs(1)
            }
            .is_success()
        );
    }

    #[test]
    fn test_timeout_counts_as_failure() {
        let status = InstanceStatus::TimedOut {
            after: Duration::from_secs(30),
        };
        assert!(status.is_failure());
        assert!(status.is_timeout());
        assert!(!status.is_unscheduled());
    }

    #[test]
    fn test_unscheduled_counts_as_failure() {
        let status = InstanceStatus::NoEligibleWorker {
            labels: vec!["centos-7".into()],
        };
        assert!(status.is_failure());
        assert!(status.is_unscheduled());
    }

    #[test]
    fn test_instance_status_display() {
        assert_eq!(InstanceStatus::Succeeded.to_string(), "SUCCESS");
        assert_eq!(
            InstanceStatus::Failed {
                exit_code: 2,
                command_index: 1
            }
            .to_string(),
            "FAILURE"
        );
        assert_eq!(
            InstanceStatus::NoEligibleWorker { labels: vec![] }.to_string(),
            "UNSCHEDULED"
        );
        assert_eq!(
            InstanceStatus::Errored {
                reason: "boom".into()
            }
            .to_string(),
            "ERROR"
        );
    }

    #[test]
    fn test_instance_status_serialize() {
        let json = serde_json::to_string(&InstanceStatus::Succeeded).unwrap();
        assert_eq!(json, r#"{"status":"succeeded"}"#);

        let json = serde_json::to_string(&InstanceStatus::Failed {
            exit_code: 3,
            command_index: 2,
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"failed","exit_code":3,"command_index":2}"#);
    }

    #[test]
    fn test_instance_status_deserialize() {
        let status: InstanceStatus =
            serde_json::from_str(r#"{"status":"no_eligible_worker","labels":["docs"]}"#).unwrap();
        assert_eq!(
            status,
            InstanceStatus::NoEligibleWorker {
                labels: vec!["docs".into()]
            }
        );
    }

    #[test]
    fn test_artifact_constructors() {
        let archive = Artifact::archive("results.xml");
        assert_eq!(archive.name, "results.xml");
        assert_eq!(archive.kind, ArtifactKind::Archive);

        assert_eq!(Artifact::coverage("coverage.json").kind, ArtifactKind::Coverage);
        assert_eq!(Artifact::test_log("test.log").kind, ArtifactKind::TestLog);
    }

    #[test]
    fn test_artifact_kind_display() {
        assert_eq!(ArtifactKind::Archive.to_string(), "archive");
        assert_eq!(ArtifactKind::Coverage.to_string(), "coverage");
        assert_eq!(ArtifactKind::TestLog.to_string(), "test-log");
    }
}
