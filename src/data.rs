// src/data.rs - Session export: per-frame CSV and a JSON summary
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Local;
use csv::Writer;
use serde::Serialize;

use crate::analysis::FrameReport;

#[derive(Debug, Serialize)]
struct FrameRecord {
    timestamp_ms: u64,
    frame: usize,
    movement: String,
    side: String,
    measured: bool,
    angle: Option<f64>,
    percent_of_target: Option<f64>,
    clinical_grade: Option<String>,
    secondary_angle: Option<f64>,
    confirmed_errors: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_name: String,
    pub total_frames: usize,
    pub measured_frames: usize,
    pub mean_angle: Option<f64>,
    pub max_angle: Option<f64>,
    pub best_percent_of_target: Option<f64>,
    /// Frames in which each error key was reported as confirmed
    pub confirmed_error_frames: BTreeMap<String, usize>,
}

pub struct SessionExporter {
    output_dir: PathBuf,
    session_name: String,
    reports: Vec<FrameReport>,
}

impl SessionExporter {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Self {
        let session_name = session_name.unwrap_or_else(|| {
            format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
        });

        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            session_name,
            reports: Vec::new(),
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn session_dir(&self) -> PathBuf {
        self.output_dir.join(&self.session_name)
    }

    pub fn add_frame(&mut self, report: FrameReport) {
        self.reports.push(report);
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn export_csv(&self) -> Result<PathBuf> {
        let csv_path = self.session_dir().join("frames.csv");
        std::fs::create_dir_all(self.session_dir())?;

        let file = File::create(&csv_path)?;
        let mut writer = Writer::from_writer(file);

        for (i, report) in self.reports.iter().enumerate() {
            writer.serialize(Self::create_record(i, report))?;
        }

        writer.flush()?;
        Ok(csv_path)
    }

    fn create_record(frame: usize, report: &FrameReport) -> FrameRecord {
        let primary = report.measurement.as_ref().map(|m| &m.primary_joint);

        FrameRecord {
            timestamp_ms: report.timestamp_ms,
            frame,
            movement: report.movement.as_str().to_string(),
            side: report.side.as_str().to_string(),
            measured: primary.is_some(),
            angle: primary.map(|p| p.angle),
            percent_of_target: primary.map(|p| p.percent_of_target),
            clinical_grade: primary.map(|p| p.clinical_grade.as_str().to_string()),
            secondary_angle: report
                .measurement
                .as_ref()
                .and_then(|m| m.secondary_joints.first())
                .map(|s| s.angle),
            confirmed_errors: report
                .confirmed
                .iter()
                .map(|c| format!("{}:{}", c.key, c.severity.as_str()))
                .collect::<Vec<_>>()
                .join(";"),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let angles: Vec<f64> = self
            .reports
            .iter()
            .filter_map(|r| r.measurement.as_ref())
            .map(|m| m.primary_joint.angle)
            .collect();

        let mut confirmed_error_frames = BTreeMap::new();
        for report in &self.reports {
            for error in &report.confirmed {
                *confirmed_error_frames.entry(error.key.clone()).or_insert(0) += 1;
            }
        }

        let mean_angle = if angles.is_empty() {
            None
        } else {
            Some(angles.iter().sum::<f64>() / angles.len() as f64)
        };

        SessionSummary {
            session_name: self.session_name.clone(),
            total_frames: self.reports.len(),
            measured_frames: angles.len(),
            mean_angle,
            max_angle: angles.iter().copied().reduce(f64::max),
            best_percent_of_target: self
                .reports
                .iter()
                .filter_map(|r| r.measurement.as_ref())
                .map(|m| m.primary_joint.percent_of_target)
                .reduce(f64::max),
            confirmed_error_frames,
        }
    }

    pub fn export_summary(&self) -> Result<PathBuf> {
        let summary_path = self.session_dir().join("summary.json");
        std::fs::create_dir_all(self.session_dir())?;

        std::fs::write(&summary_path, serde_json::to_string_pretty(&self.summary())?)?;
        Ok(summary_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MovementAnalyzer;
    use crate::joint_angles::Movement;
    use crate::landmarks::Side;
    use crate::pose_source::{PoseSource, SyntheticPoseSource};
    use crate::thresholds::ThresholdTable;

    fn exporter_with_frames(dir: &Path, hike: f64) -> SessionExporter {
        let table = ThresholdTable::clinical_defaults();
        let mut analyzer = MovementAnalyzer::default();
        let mut source = SyntheticPoseSource::new(Movement::ShoulderAbduction, Side::Right, 30)
            .with_shoulder_hike(hike);
        let mut exporter = SessionExporter::new(dir, Some("test_session".to_string()));

        while let Some(frame) = source.next_frame().unwrap() {
            exporter.add_frame(analyzer.analyze(&frame, Movement::ShoulderAbduction, Side::Right, &table));
        }
        exporter
    }

    #[test]
    fn test_summary_counts() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = exporter_with_frames(dir.path(), 0.05);
        let summary = exporter.summary();

        assert_eq!(summary.total_frames, 30);
        assert!(summary.measured_frames > 0);
        assert!(summary.max_angle.unwrap() >= summary.mean_angle.unwrap());
        assert!(summary.confirmed_error_frames.contains_key("shoulder_hiking_right"));
    }

    #[test]
    fn test_csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = exporter_with_frames(dir.path(), 0.0);
        let path = exporter.export_csv().unwrap();

        assert_eq!(path, dir.path().join("test_session").join("frames.csv"));
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "timestamp_ms");
        assert_eq!(reader.records().count(), 30);
    }

    #[test]
    fn test_summary_export() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = exporter_with_frames(dir.path(), 0.0);
        let path = exporter.export_summary().unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["session_name"], "test_session");
        assert_eq!(value["total_frames"], 30);
    }

    #[test]
    fn test_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SessionExporter::new(dir.path(), None);
        let summary = exporter.summary();

        assert!(exporter.is_empty());
        assert!(exporter.session_name().starts_with("session_"));
        assert_eq!(summary.mean_angle, None);
        assert_eq!(summary.max_angle, None);
    }
}
