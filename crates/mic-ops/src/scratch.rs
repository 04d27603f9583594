//! Scratch workspace for corrected samples.
//!
//! A [`Workspace`] holds the `f64` output of one stack between correction and
//! finalization. Small stacks live on the heap; large ones in a memory-mapped
//! file inside a private temporary directory, so the working set is backed by
//! disk rather than RAM. Storage is released by [`Workspace::release`] or,
//! failing that, on drop. Release failures are logged and never returned.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use mic_core::StackShape;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::{OpsError, OpsResult};

/// Heap budget used by [`ScratchPolicy::default`].
pub const DEFAULT_MAX_HEAP_BYTES: u64 = 4 * 1024 * 1024 * 1024;

const SCRATCH_FILE: &str = "workspace.f64";

/// Where corrected samples are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchPolicy {
    /// Always on the heap.
    Memory,
    /// Always in a memory-mapped temporary file.
    Disk,
    /// Heap up to `max_heap_bytes`, disk above.
    Auto {
        /// Largest workspace kept on the heap.
        max_heap_bytes: u64,
    },
}

impl Default for ScratchPolicy {
    fn default() -> Self {
        ScratchPolicy::Auto {
            max_heap_bytes: DEFAULT_MAX_HEAP_BYTES,
        }
    }
}

impl ScratchPolicy {
    fn use_disk(&self, bytes: u64) -> bool {
        match *self {
            ScratchPolicy::Memory => false,
            ScratchPolicy::Disk => true,
            ScratchPolicy::Auto { max_heap_bytes } => bytes > max_heap_bytes,
        }
    }
}

enum Storage {
    Heap(Vec<f64>),
    Mapped { map: MmapMut, dir: TempDir },
    Released,
}

/// `f64` buffer shaped like one input stack.
pub struct Workspace {
    shape: StackShape,
    storage: Storage,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = match &self.storage {
            Storage::Heap(_) => "heap",
            Storage::Mapped { .. } => "mapped",
            Storage::Released => "released",
        };
        f.debug_struct("Workspace")
            .field("shape", &self.shape)
            .field("storage", &storage)
            .finish()
    }
}

impl Workspace {
    /// Allocates a zeroed workspace for `shape`.
    ///
    /// Disk-backed workspaces are created in a fresh temporary directory
    /// under `scratch_root`.
    pub fn allocate(shape: StackShape, policy: ScratchPolicy, scratch_root: &Path) -> OpsResult<Self> {
        let len = shape.validate()?;
        let bytes = len
            .checked_mul(size_of::<f64>())
            .ok_or_else(|| OpsError::InvalidDimensions("workspace size overflows".into()))?;

        let storage = if policy.use_disk(bytes as u64) {
            map_scratch_file(scratch_root, bytes)?
        } else {
            let mut data = Vec::new();
            data.try_reserve_exact(len).map_err(|e| OpsError::Scratch {
                path: PathBuf::from("<heap>"),
                source: io::Error::new(io::ErrorKind::OutOfMemory, e.to_string()),
            })?;
            data.resize(len, 0.0);
            Storage::Heap(data)
        };

        let workspace = Self { shape, storage };
        debug!(shape = ?shape.dims(), bytes, storage = ?workspace, "allocated workspace");
        Ok(workspace)
    }

    /// Shape of the stack the workspace belongs to.
    #[inline]
    pub fn shape(&self) -> StackShape {
        self.shape
    }

    /// `true` when backed by a memory-mapped file.
    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mapped { .. })
    }

    /// Path of the backing file, if any.
    pub fn scratch_path(&self) -> Option<PathBuf> {
        match &self.storage {
            Storage::Mapped { dir, .. } => Some(dir.path().join(SCRATCH_FILE)),
            _ => None,
        }
    }

    /// Samples, `[D, H, W, C]` row-major.
    pub fn as_slice(&self) -> &[f64] {
        match &self.storage {
            Storage::Heap(v) => v,
            Storage::Mapped { map, .. } => bytemuck::cast_slice(&map[..]),
            Storage::Released => &[],
        }
    }

    /// Mutable samples, `[D, H, W, C]` row-major.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        match &mut self.storage {
            Storage::Heap(v) => v,
            Storage::Mapped { map, .. } => bytemuck::cast_slice_mut(&mut map[..]),
            Storage::Released => &mut [],
        }
    }

    /// Frees the storage now.
    pub fn release(mut self) {
        self.release_storage();
    }

    fn release_storage(&mut self) {
        match std::mem::replace(&mut self.storage, Storage::Released) {
            Storage::Mapped { map, dir } => {
                drop(map);
                let path = dir.path().to_path_buf();
                if let Err(e) = dir.close() {
                    warn!(path = %path.display(), error = %e, "failed to remove scratch directory");
                } else {
                    debug!(path = %path.display(), "released scratch file");
                }
            }
            Storage::Heap(_) | Storage::Released => {}
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release_storage();
    }
}

fn map_scratch_file(root: &Path, bytes: usize) -> OpsResult<Storage> {
    let scratch_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| OpsError::Scratch { path, source }
    };

    std::fs::create_dir_all(root).map_err(scratch_err(root))?;
    let dir = tempfile::Builder::new()
        .prefix(".mic-")
        .tempdir_in(root)
        .map_err(scratch_err(root))?;

    let path = dir.path().join(SCRATCH_FILE);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(scratch_err(&path))?;
    file.set_len(bytes as u64).map_err(scratch_err(&path))?;

    // SAFETY: the file lives in a private temporary directory owned by this
    // workspace and is not resized or mapped elsewhere while the map exists.
    let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(scratch_err(&path))?;

    if bytemuck::try_cast_slice_mut::<u8, f64>(&mut map[..]).is_err() {
        return Err(OpsError::Scratch {
            path,
            source: io::Error::other("mapping is not aligned for f64"),
        });
    }
    Ok(Storage::Mapped { map, dir })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_workspace() {
        let tmp = TempDir::new().unwrap();
        let shape = StackShape::zyxc(2, 3, 4, 3);
        let mut ws = Workspace::allocate(shape, ScratchPolicy::Memory, tmp.path()).unwrap();
        assert!(!ws.is_mapped());
        assert_eq!(ws.as_slice().len(), shape.len());
        ws.as_mut_slice()[5] = 2.5;
        assert_eq!(ws.as_slice()[5], 2.5);
    }

    #[test]
    fn test_disk_workspace_released() {
        let tmp = TempDir::new().unwrap();
        let shape = StackShape::zyx(3, 16, 16);
        let mut ws = Workspace::allocate(shape, ScratchPolicy::Disk, tmp.path()).unwrap();
        assert!(ws.is_mapped());
        let path = ws.scratch_path().unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), (shape.len() * 8) as u64);

        assert!(ws.as_slice().iter().all(|&v| v == 0.0));
        ws.as_mut_slice().iter_mut().enumerate().for_each(|(i, v)| *v = i as f64);
        assert_eq!(ws.as_slice()[767], 767.0);

        ws.release();
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());
    }

    #[test]
    fn test_drop_releases() {
        let tmp = TempDir::new().unwrap();
        let path = {
            let ws = Workspace::allocate(StackShape::zyx(1, 4, 4), ScratchPolicy::Disk, tmp.path()).unwrap();
            ws.scratch_path().unwrap()
        };
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_auto_policy() {
        let tmp = TempDir::new().unwrap();
        let shape = StackShape::zyx(1, 8, 8);
        let small = Workspace::allocate(shape, ScratchPolicy::Auto { max_heap_bytes: 512 }, tmp.path()).unwrap();
        assert!(!small.is_mapped());
        let big = Workspace::allocate(shape, ScratchPolicy::Auto { max_heap_bytes: 511 }, tmp.path()).unwrap();
        assert!(big.is_mapped());
    }

    #[test]
    fn test_invalid_shape() {
        let tmp = TempDir::new().unwrap();
        assert!(Workspace::allocate(StackShape::zyx(0, 4, 4), ScratchPolicy::Memory, tmp.path()).is_err());
    }
}
