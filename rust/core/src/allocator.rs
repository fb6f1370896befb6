// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! First-fit placement of meshes into layers

use crate::config::StrataConfig;
use crate::gpu::GpuBackend;
use crate::layer::{Layer, LayerCapacity, LayerMeshParams};
use crate::{Error, Result};
use std::rc::Rc;
use std::sync::Arc;
use strata_geometry::{CompressedGeometry, RtcOrigin};

/// Where a mesh ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Index into [`LayerAllocator::layers`]
    pub layer: usize,
    pub mesh_index: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub layers: usize,
    pub built_layers: usize,
    pub meshes: usize,
    pub vertices: usize,
}

/// Owns the layers of one model and decides which layer each mesh joins.
///
/// A mesh goes to the first unbuilt layer with the same primitive type and
/// RTC origin that can hold it. If none can, a new layer is opened; when
/// even an empty layer is too small the mesh is rejected.
pub struct LayerAllocator {
    gpu: Rc<dyn GpuBackend>,
    capacity: LayerCapacity,
    texture_width: u32,
    layers: Vec<Layer>,
}

impl std::fmt::Debug for LayerAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerAllocator")
            .field("capacity", &self.capacity)
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}

impl LayerAllocator {
    pub fn new(gpu: Rc<dyn GpuBackend>, capacity: LayerCapacity, texture_width: u32) -> Self {
        Self {
            gpu,
            capacity,
            texture_width,
            layers: Vec::new(),
        }
    }

    pub fn from_config(gpu: Rc<dyn GpuBackend>, config: &StrataConfig) -> Self {
        Self::new(gpu, config.layer_capacity(), config.texture_width)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn layers_mut(&mut self) -> impl Iterator<Item = &mut Layer> {
        self.layers.iter_mut()
    }

    /// Place a mesh of `geometry`, uploading the geometry into the chosen
    /// layer if it is not there yet.
    pub fn place(
        &mut self,
        geometry: &Arc<CompressedGeometry>,
        origin: RtcOrigin,
        mesh: &LayerMeshParams<'_>,
        view_slots: &[usize],
    ) -> Result<Placement> {
        let existing = self.layers.iter().position(|layer| {
            !layer.is_built()
                && !layer.is_destroyed()
                && layer.primitive() == geometry.primitive()
                && layer.origin().key() == origin.key()
                && layer.can_create_mesh(geometry)
        });

        let index = match existing {
            Some(index) => index,
            None => {
                let layer = Layer::new(
                    self.layers.len() as u32,
                    geometry.primitive(),
                    origin,
                    self.capacity,
                    self.texture_width,
                    Rc::clone(&self.gpu),
                    view_slots,
                );
                if !layer.can_create_mesh(geometry) {
                    return Err(Error::CapacityExceeded {
                        geometry: geometry.id().to_string(),
                        reason: format!(
                            "{} vertices, {:?} primitives by width and {} buckets exceed an empty layer",
                            geometry.num_vertices(),
                            geometry.primitives_by_width(),
                            geometry.buckets().len()
                        ),
                    });
                }
                tracing::debug!(
                    layer = layer.id(),
                    primitive = %geometry.primitive(),
                    origin = ?origin.to_array(),
                    "opened layer"
                );
                self.layers.push(layer);
                self.layers.len() - 1
            }
        };

        let layer = &mut self.layers[index];
        if !layer.has_geometry(geometry.id()) {
            layer.create_geometry_compressed(Arc::clone(geometry))?;
        }
        let mesh_index = layer.create_mesh(mesh)?;
        Ok(Placement {
            layer: index,
            mesh_index,
        })
    }

    /// Build every layer still accepting meshes.
    pub fn build_all(&mut self) -> Result<()> {
        for layer in self.layers.iter_mut().filter(|l| !l.is_built() && !l.is_destroyed()) {
            layer.build()?;
            layer.flush_init_flags()?;
        }
        Ok(())
    }

    pub fn destroy_all(&mut self) {
        for layer in &mut self.layers {
            layer.destroy();
        }
    }

    pub fn register_view(&mut self, slot: usize) -> Result<()> {
        for layer in self.layers.iter_mut().filter(|l| !l.is_destroyed()) {
            layer.register_view(slot)?;
        }
        Ok(())
    }

    pub fn release_view(&mut self, slot: usize) {
        for layer in &mut self.layers {
            layer.release_view(slot);
        }
    }

    pub fn begin_deferred_flags(&mut self) {
        for layer in &mut self.layers {
            layer.begin_deferred_flags();
        }
    }

    /// Returns the number of texture uploads issued.
    pub fn commit_deferred_flags(&mut self) -> Result<usize> {
        let mut uploads = 0;
        for layer in self.layers.iter_mut().filter(|l| !l.is_destroyed()) {
            uploads += layer.commit_deferred_flags()?;
        }
        Ok(uploads)
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            layers: self.layers.len(),
            built_layers: self.layers.iter().filter(|l| l.is_built()).count(),
            meshes: self.layers.iter().map(Layer::num_meshes).sum(),
            vertices: self.layers.iter().map(Layer::num_vertices).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingGpu;
    use crate::layer::test_support::{mesh_params, strip_geometry};
    use strata_geometry::PrimitiveType;

    fn allocator(gpu: &Rc<RecordingGpu>, max_vertices: usize) -> LayerAllocator {
        LayerAllocator::new(
            gpu.clone(),
            LayerCapacity {
                max_vertices,
                max_primitives: 10_000,
                max_slots: 1_000,
                max_meshes: 1_000,
            },
            16,
        )
    }

    #[test]
    fn test_first_fit_opens_second_layer() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut allocator = allocator(&gpu, 100);
        let a = strip_geometry("a", 60);
        let b = strip_geometry("b", 60);

        let first = allocator
            .place(&a, RtcOrigin::default(), &mesh_params("a"), &[0])
            .unwrap();
        let second = allocator
            .place(&b, RtcOrigin::default(), &mesh_params("b"), &[0])
            .unwrap();
        assert_eq!(first.layer, 0);
        assert_eq!(second.layer, 1);
        assert_eq!(allocator.stats().layers, 2);
    }

    #[test]
    fn test_instances_share_layer_vertices() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut allocator = allocator(&gpu, 100);
        let a = strip_geometry("a", 60);
        for _ in 0..3 {
            allocator
                .place(&a, RtcOrigin::default(), &mesh_params("a"), &[0])
                .unwrap();
        }
        let stats = allocator.stats();
        assert_eq!(stats.layers, 1);
        assert_eq!(stats.meshes, 3);
        assert_eq!(stats.vertices, 60);
    }

    #[test]
    fn test_origins_and_primitives_never_share() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut allocator = allocator(&gpu, 1000);
        let a = strip_geometry("a", 10);
        allocator
            .place(&a, RtcOrigin::default(), &mesh_params("a"), &[0])
            .unwrap();
        let far = allocator
            .place(&a, RtcOrigin::new(1000.0, 0.0, 0.0), &mesh_params("a"), &[0])
            .unwrap();
        assert_eq!(far.layer, 1);
        assert_eq!(allocator.layers()[1].primitive(), PrimitiveType::Triangles);
    }

    #[test]
    fn test_oversized_geometry_rejected() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut allocator = allocator(&gpu, 50);
        let big = strip_geometry("big", 60);
        let err = allocator
            .place(&big, RtcOrigin::default(), &mesh_params("big"), &[0])
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
        assert!(allocator.layers().is_empty());
    }

    #[test]
    fn test_built_layers_take_no_new_meshes() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut allocator = allocator(&gpu, 1000);
        let a = strip_geometry("a", 10);
        allocator
            .place(&a, RtcOrigin::default(), &mesh_params("a"), &[0])
            .unwrap();
        allocator.build_all().unwrap();
        let later = allocator
            .place(&a, RtcOrigin::default(), &mesh_params("a"), &[0])
            .unwrap();
        assert_eq!(later.layer, 1);
    }
}
