use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::{
    Config, Engine, LayerflowError, Result,
    registry::{TaskHandler, TaskRegistry},
    tasks,
};

pub struct EngineBuilder {
    config: Config,
    registry: TaskRegistry,
    rt: Option<Arc<Runtime>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        let mut registry = TaskRegistry::new();
        tasks::register_builtin_tasks(&mut registry);

        Self {
            config: Config::default(),
            registry,
            rt: None,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.async_worker_thread_number = n;
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// Register a task handler under a `module.function` name. Built-in
    /// handlers can be overridden by re-registering their name.
    pub fn register(
        mut self,
        name: &str,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        self.registry.register(name, handler);
        self
    }

    pub fn build(&self) -> Result<Engine> {
        let runtime = match &self.rt {
            Some(rt) => rt.clone(),
            None => Arc::new(
                Builder::new_multi_thread()
                    .worker_threads(self.config.async_worker_thread_number.into())
                    .enable_all()
                    .build()
                    .map_err(|err| LayerflowError::Engine(err.to_string()))?,
            ),
        };

        Ok(Engine::new_with_config(self.config.clone(), self.registry.clone(), runtime))
    }
}
