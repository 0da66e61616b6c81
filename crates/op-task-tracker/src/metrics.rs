use prometheus::{IntCounter, IntGauge, Registry};

/// Task execution metrics collector
#[derive(Clone)]
pub struct TrackerMetrics {
    /// Task operations seen starting
    task_operations_started: IntCounter,

    /// Task operations seen finishing
    task_operations_finished: IntCounter,

    /// Task operations currently in the running set
    running_task_operations: IntGauge,

    /// Calls to the execution context query
    queries: IntCounter,

    /// Queries that found an enclosing task
    query_hits: IntCounter,

    /// Registry for scraping
    registry: Registry,
}

impl TrackerMetrics {
    /// Create new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let task_operations_started = IntCounter::new(
            "task_operations_started_total",
            "Total number of task execution operations started",
        )?;
        registry.register(Box::new(task_operations_started.clone()))?;

        let task_operations_finished = IntCounter::new(
            "task_operations_finished_total",
            "Total number of task execution operations finished",
        )?;
        registry.register(Box::new(task_operations_finished.clone()))?;

        let running_task_operations = IntGauge::new(
            "running_task_operations",
            "Number of task execution operations currently running",
        )?;
        registry.register(Box::new(running_task_operations.clone()))?;

        let queries = IntCounter::new(
            "task_execution_queries_total",
            "Total number of task execution context queries",
        )?;
        registry.register(Box::new(queries.clone()))?;

        let query_hits = IntCounter::new(
            "task_execution_query_hits_total",
            "Total number of queries answered with an enclosing task",
        )?;
        registry.register(Box::new(query_hits.clone()))?;

        Ok(Self {
            task_operations_started,
            task_operations_finished,
            running_task_operations,
            queries,
            query_hits,
            registry,
        })
    }

    /// `running` is the size of the running set after the insert
    pub fn task_started(&self, running: usize) {
        self.task_operations_started.inc();
        self.set_running(running);
    }

    /// `running` is the size of the running set after the removal
    pub fn task_finished(&self, running: usize) {
        self.task_operations_finished.inc();
        self.set_running(running);
    }

    pub fn set_running(&self, running: usize) {
        self.running_task_operations.set(running as i64);
    }

    pub fn running(&self) -> i64 {
        self.running_task_operations.get()
    }

    pub fn query_answered(&self, inside_task: bool) {
        self.queries.inc();
        if inside_task {
            self.query_hits.inc();
        }
    }

    /// Get metrics registry for scraping
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get metrics as JSON, one entry per metric family with its current value
    pub fn gather_json(&self) -> serde_json::Value {
        let mut metrics = Vec::new();

        for family in self.registry.gather() {
            let value = family
                .get_metric()
                .first()
                .map(|m| {
                    if m.has_counter() {
                        m.get_counter().get_value()
                    } else {
                        m.get_gauge().get_value()
                    }
                })
                .unwrap_or_default();
            metrics.push(serde_json::json!({
                "name": family.get_name(),
                "help": family.get_help(),
                "value": value,
            }));
        }

        serde_json::json!({
            "metrics": metrics
        })
    }
}
