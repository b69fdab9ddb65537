//! In-memory platform used by unit tests

use super::{Platform, PlatformError, PlatformResult, Table};
use crate::models::{
    Comment, CommentQuery, DataSource, DataSourceSpec, ModelHandle, ModelSpec, ModelStatus,
    Project,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fake platform holding resources and canned predictions in memory
#[derive(Default)]
pub struct MockPlatform {
    pub projects: Mutex<HashSet<String>>,
    pub databases: Mutex<HashMap<String, DataSource>>,
    pub models: Mutex<HashMap<(String, String), ModelHandle>>,
    /// Status polls remaining before a new model reports complete
    pub training_polls: AtomicUsize,
    /// Models that fail training
    pub failing_models: Mutex<HashSet<String>>,
    /// Comments per video id
    pub comments: Mutex<HashMap<String, Vec<Comment>>>,
    /// Canned label per comment text, keyed by predict column
    pub labels: Mutex<HashMap<String, HashMap<String, String>>>,
    /// Predict columns whose calls fail
    pub failing_predictions: Mutex<HashSet<String>>,
    /// Predict columns whose calls never finish in time
    pub slow_predictions: Mutex<HashSet<String>>,
    /// Predict columns whose calls panic
    pub panicking_predictions: Mutex<HashSet<String>>,
    /// Another writer creates the resource just before us, so creation
    /// stores it but still answers "already exists"
    pub race_on_create: Mutex<bool>,
    /// Creation calls fail with a non-conflict error
    pub broken_create: Mutex<bool>,
    pub create_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comments(self, video_id: &str, comments: &[(&str, &str, &str)]) -> Self {
        let mut labels = self.labels.lock().unwrap();
        let mut stored = Vec::new();
        for (text, sentiment, spam) in comments {
            stored.push(Comment {
                display_name: "viewer".to_string(),
                username: "@viewer".to_string(),
                comment: text.to_string(),
            });
            labels
                .entry("sentiment".to_string())
                .or_default()
                .insert(text.to_string(), sentiment.to_string());
            labels
                .entry("spam".to_string())
                .or_default()
                .insert(text.to_string(), spam.to_string());
        }
        drop(labels);
        self.comments
            .lock()
            .unwrap()
            .insert(video_id.to_string(), stored);
        self
    }

    fn comments_for(&self, query: &CommentQuery) -> Vec<Comment> {
        self.comments
            .lock()
            .unwrap()
            .get(&query.video_id)
            .map(|c| c.iter().take(query.limit as usize).cloned().collect())
            .unwrap_or_default()
    }

    fn check_create(&self) -> PlatformResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if *self.broken_create.lock().unwrap() {
            return Err(PlatformError::Query("storage unavailable".to_string()));
        }
        Ok(())
    }

    fn check_conflict(&self, what: &str) -> PlatformResult<()> {
        if *self.race_on_create.lock().unwrap() {
            return Err(PlatformError::AlreadyExists(what.to_string()));
        }
        Ok(())
    }

    async fn prediction_gate(&self, column: &str) -> PlatformResult<()> {
        let panics = self.panicking_predictions.lock().unwrap().contains(column);
        if panics {
            panic!("{} model crashed", column);
        }
        let slow = self.slow_predictions.lock().unwrap().contains(column);
        if slow {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let failing = self.failing_predictions.lock().unwrap().contains(column);
        if failing {
            return Err(PlatformError::Query(format!("{} model unavailable", column)));
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn find_project(&self, name: &str) -> PlatformResult<Option<Project>> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .get(name)
            .map(|name| Project { name: name.clone() }))
    }

    async fn create_project(&self, name: &str) -> PlatformResult<Project> {
        self.check_create()?;
        self.projects.lock().unwrap().insert(name.to_string());
        self.check_conflict(name)?;
        Ok(Project {
            name: name.to_string(),
        })
    }

    async fn find_database(&self, name: &str) -> PlatformResult<Option<DataSource>> {
        Ok(self.databases.lock().unwrap().get(name).cloned())
    }

    async fn create_database(&self, spec: &DataSourceSpec) -> PlatformResult<DataSource> {
        self.check_create()?;
        let source = DataSource {
            name: spec.name.clone(),
            engine: spec.engine.clone(),
        };
        self.databases
            .lock()
            .unwrap()
            .insert(spec.name.clone(), source.clone());
        self.check_conflict(&spec.name)?;
        Ok(source)
    }

    async fn find_model(&self, project: &str, name: &str) -> PlatformResult<Option<ModelHandle>> {
        Ok(self
            .models
            .lock()
            .unwrap()
            .get(&(project.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_model(&self, project: &str, spec: &ModelSpec) -> PlatformResult<ModelHandle> {
        self.check_create()?;
        let handle = ModelHandle {
            project: project.to_string(),
            name: spec.name.clone(),
            predict: spec.predict.clone(),
            status: ModelStatus::Generating,
        };
        self.models
            .lock()
            .unwrap()
            .insert((project.to_string(), spec.name.clone()), handle.clone());
        self.check_conflict(&spec.name)?;
        Ok(handle)
    }

    async fn model_status(&self, project: &str, name: &str) -> PlatformResult<ModelStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_models.lock().unwrap().contains(name) {
            return Ok(ModelStatus::Error("training crashed".to_string()));
        }

        let remaining = self.training_polls.load(Ordering::SeqCst);
        let status = if remaining > 0 {
            self.training_polls.store(remaining - 1, Ordering::SeqCst);
            ModelStatus::Training
        } else {
            ModelStatus::Complete
        };

        let mut models = self.models.lock().unwrap();
        let model = models
            .get_mut(&(project.to_string(), name.to_string()))
            .ok_or_else(|| PlatformError::NotFound(format!("model {}.{}", project, name)))?;
        model.status = status.clone();
        Ok(status)
    }

    async fn fetch_comments(
        &self,
        _source: &DataSource,
        query: &CommentQuery,
    ) -> PlatformResult<Vec<Comment>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.comments_for(query))
    }

    async fn predict_comments(
        &self,
        model: &ModelHandle,
        _source: &DataSource,
        query: &CommentQuery,
    ) -> PlatformResult<Table> {
        self.prediction_gate(&model.predict).await?;

        let labels = self.labels.lock().unwrap();
        let column_labels = labels.get(&model.predict).cloned().unwrap_or_default();
        let rows = self
            .comments_for(query)
            .into_iter()
            .map(|c| {
                let label = column_labels
                    .get(&c.comment)
                    .map(|l| json!(l))
                    .unwrap_or(Value::Null);
                vec![json!(c.comment), label]
            })
            .collect();

        Ok(Table::new(
            vec!["comment".to_string(), model.predict.clone()],
            rows,
        ))
    }

    async fn predict_row(
        &self,
        model: &ModelHandle,
        inputs: &Map<String, Value>,
    ) -> PlatformResult<Table> {
        self.prediction_gate(&model.predict).await?;

        let comments = inputs
            .get("comments")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(Table::new(
            vec!["comments".to_string(), model.predict.clone()],
            vec![vec![
                json!(comments),
                json!(format!("{} of: {}", model.predict, comments)),
            ]],
        ))
    }
}
