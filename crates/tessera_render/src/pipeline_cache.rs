//! Renderer-owned pipeline cache keyed by shader entry-point name.
//!
//! Each renderer holds its own cache; there is no process-wide pipeline state.

use std::collections::HashMap;

pub struct PipelineCache<P> {
    pipelines: HashMap<String, P>,
}

impl<P> PipelineCache<P> {
    pub fn new() -> Self {
        Self {
            pipelines: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&P> {
        self.pipelines.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    pub fn get_or_create(&mut self, name: &str, create: impl FnOnce() -> P) -> &P {
        self.pipelines
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(name, "creating pipeline");
                create()
            })
    }

    /// Like [`PipelineCache::get_or_create`]; a failed build leaves no entry.
    pub fn get_or_try_create<E>(
        &mut self,
        name: &str,
        create: impl FnOnce() -> Result<P, E>,
    ) -> Result<&P, E> {
        if !self.pipelines.contains_key(name) {
            let pipeline = create()?;
            tracing::debug!(name, "created pipeline");
            self.pipelines.insert(name.to_string(), pipeline);
        }
        Ok(&self.pipelines[name])
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn clear(&mut self) {
        self.pipelines.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }
}

impl<P> Default for PipelineCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

pub type ComputePipelineCache = PipelineCache<wgpu::ComputePipeline>;

impl PipelineCache<wgpu::ComputePipeline> {
    /// Compute pipeline for `entry_point` in `module`, built on first use.
    ///
    /// With `layout: None` the layout is derived from the shader.
    pub fn compute(
        &mut self,
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        layout: Option<&wgpu::PipelineLayout>,
        entry_point: &str,
    ) -> &wgpu::ComputePipeline {
        self.get_or_create(entry_point, || {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout,
                module,
                entry_point: Some(entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_once_per_name() {
        let mut cache = PipelineCache::new();
        let mut builds = 0;

        for _ in 0..3 {
            let p = *cache.get_or_create("terrain_update", || {
                builds += 1;
                7u32
            });
            assert_eq!(p, 7);
        }
        cache.get_or_create("particle_sim", || 9u32);

        assert_eq!(builds, 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("particle_sim"), Some(&9));
        assert!(!cache.contains("missing"));
    }

    #[test]
    fn failed_build_is_not_cached() {
        let mut cache: PipelineCache<u32> = PipelineCache::new();
        let err = cache
            .get_or_try_create("broken", || Err::<u32, _>("missing function"))
            .unwrap_err();
        assert_eq!(err, "missing function");
        assert!(cache.is_empty());

        let ok = cache.get_or_try_create("broken", || Ok::<_, &str>(1)).unwrap();
        assert_eq!(*ok, 1);
    }

    #[test]
    fn caches_are_independent() {
        let mut a = PipelineCache::new();
        let b: PipelineCache<u32> = PipelineCache::default();
        a.get_or_create("shade", || 1u32);
        assert!(a.contains("shade"));
        assert!(!b.contains("shade"));

        a.clear();
        assert_eq!(a.names().count(), 0);
    }
}
