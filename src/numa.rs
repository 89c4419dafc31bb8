// src/numa.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! NUMA topology detection, per-node data replication and thread pinning.
//!
//! `NumaTopology` detects nodes and their CPUs via hwlocality, with a
//! single-node fallback when NUMA information is unavailable.
//! `NumaReplicator<T>` keeps one immutable copy of `T` per node so that
//! worker threads read local memory during the sweep over the feature
//! matrix. `ThreadDistributor` maps worker indices to CPU cores using a
//! sibling/cache-cost heuristic so workers spread across physical cores
//! before stacking onto SMT siblings.

use std::sync::Arc;

use crate::error::{DismecError, Result};

#[cfg(feature = "numa")]
use hwlocality::{object::types::ObjectType, Topology};

/// A single NUMA node and the CPUs that belong to it.
#[derive(Debug, Clone)]
pub struct NumaNode {
    pub node_id: usize,
    pub cpus: Vec<usize>,
}

/// Detected system topology.
#[derive(Debug, Clone)]
pub struct NumaTopology {
    pub num_nodes: usize,
    pub physical_cores: usize,
    pub logical_cpus: usize,
    pub nodes: Vec<NumaNode>,
    pub is_uma: bool,
}

impl NumaTopology {
    /// Detect NUMA topology. Falls back to a single UMA node if the
    /// platform exposes no NUMA information.
    pub fn detect() -> Result<Self> {
        #[cfg(feature = "numa")]
        {
            Self::detect_hwloc()
        }
        #[cfg(not(feature = "numa"))]
        {
            Ok(Self::single_node())
        }
    }

    #[cfg(feature = "numa")]
    fn detect_hwloc() -> Result<Self> {
        tracing::debug!("detecting NUMA topology via hwlocality");

        let topology = Topology::new()
            .map_err(|e| DismecError::Topology(format!("failed to query topology: {e}")))?;

        let numa_nodes: Vec<_> = topology.objects_with_type(ObjectType::NUMANode).collect();
        let num_nodes = numa_nodes.len().max(1);
        let is_uma = num_nodes == 1;

        tracing::info!("detected {} NUMA node(s)", num_nodes);

        let nodes: Vec<NumaNode> = if numa_nodes.is_empty() {
            vec![NumaNode {
                node_id: 0,
                cpus: (0..num_cpus::get()).collect(),
            }]
        } else {
            let num_pus = topology.objects_with_type(ObjectType::PU).count();
            numa_nodes
                .iter()
                .filter_map(|node| {
                    let node_id = node.os_index()?;
                    let cpuset = node.cpuset()?;
                    let cpus: Vec<usize> = (0..num_pus).filter(|&cpu| cpuset.is_set(cpu)).collect();
                    Some(NumaNode { node_id, cpus })
                })
                .collect()
        };

        Ok(Self {
            num_nodes,
            physical_cores: num_cpus::get_physical(),
            logical_cpus: num_cpus::get(),
            nodes,
            is_uma,
        })
    }

    fn single_node() -> Self {
        NumaTopology {
            num_nodes: 1,
            physical_cores: num_cpus::get_physical(),
            logical_cpus: num_cpus::get(),
            nodes: vec![NumaNode {
                node_id: 0,
                cpus: (0..num_cpus::get()).collect(),
            }],
            is_uma: true,
        }
    }

    pub fn should_enable_numa_pinning(&self) -> bool {
        self.num_nodes > 1
    }

    pub fn deployment_type(&self) -> &str {
        if self.is_uma {
            "UMA (single NUMA node)"
        } else {
            "NUMA (multi-socket system)"
        }
    }

    pub fn cpus_for_node(&self, node_id: usize) -> Option<&[usize]> {
        self.nodes
            .iter()
            .find(|n| n.node_id == node_id)
            .map(|n| n.cpus.as_slice())
    }
}

/// Holds one immutable copy of `T` per NUMA node and serves the copy local
/// to the calling thread. Degrades to a single shared copy when NUMA is
/// unavailable or has only one node.
///
/// The non-generic bookkeeping (node enumeration, which node the caller is
/// currently on) lives outside this type; it is parameterized only on the
/// construction closure, so no runtime type erasure is needed at the call
/// site.
pub struct NumaReplicator<T> {
    copies: Vec<Arc<T>>,
    has_numa: bool,
}

impl<T> NumaReplicator<T> {
    /// Build one copy per NUMA node using `make_copy`. The closure is
    /// invoked once per node; on a non-NUMA system it is invoked exactly
    /// once.
    pub fn new(topology: &NumaTopology, mut make_copy: impl FnMut() -> T) -> Self {
        let has_numa = topology.should_enable_numa_pinning();
        let n = if has_numa { topology.num_nodes } else { 1 };
        let copies = (0..n).map(|_| Arc::new(make_copy())).collect();
        NumaReplicator { copies, has_numa }
    }

    pub fn has_numa(&self) -> bool {
        self.has_numa
    }

    pub fn num_numa(&self) -> usize {
        self.copies.len()
    }

    /// Returns the copy local to the given NUMA node, falling back to the
    /// single authoritative copy if the node has none or NUMA is disabled.
    pub fn local(&self, node_id: usize) -> Arc<T> {
        if self.has_numa {
            self.copies
                .get(node_id)
                .cloned()
                .unwrap_or_else(|| self.copies[0].clone())
        } else {
            self.copies[0].clone()
        }
    }
}

struct NodeLoad {
    node_id: usize,
    cpus: Vec<usize>,
    load: Vec<u32>,
}

impl NodeLoad {
    fn place_thread(
        &mut self,
        smt_siblings: impl Fn(usize) -> Vec<usize>,
        cache_siblings: impl Fn(usize) -> Vec<usize>,
    ) -> usize {
        let (index, _) = self
            .load
            .iter()
            .enumerate()
            .min_by_key(|&(_, &l)| l)
            .expect("node has at least one cpu");
        self.load[index] += 10;

        let chosen_cpu = self.cpus[index];
        for sibling in smt_siblings(chosen_cpu) {
            if let Some(pos) = self.cpus.iter().position(|&c| c == sibling) {
                self.load[pos] += 5;
            }
        }
        for sibling in cache_siblings(chosen_cpu) {
            if let Some(pos) = self.cpus.iter().position(|&c| c == sibling) {
                self.load[pos] += 1;
            }
        }
        chosen_cpu
    }

    fn max_load(&self) -> u32 {
        self.load.iter().copied().max().unwrap_or(0)
    }
}

/// Assigns worker threads to CPU cores so that workers spread across
/// physical cores (and NUMA nodes) before two of them land on SMT siblings
/// or cores that share a cache level.
pub struct ThreadDistributor {
    target_cpus: Vec<usize>,
}

impl ThreadDistributor {
    pub fn new(num_threads: usize, topology: &NumaTopology) -> Self {
        #[cfg(feature = "numa")]
        let (smt_siblings, cache_siblings) = hwloc_sibling_queries();
        #[cfg(not(feature = "numa"))]
        let (smt_siblings, cache_siblings): (fn(usize) -> Vec<usize>, fn(usize) -> Vec<usize>) =
            (|_| Vec::new(), |_| Vec::new());

        let mut nodes: Vec<NodeLoad> = topology
            .nodes
            .iter()
            .filter(|n| !n.cpus.is_empty())
            .map(|n| NodeLoad {
                node_id: n.node_id,
                cpus: n.cpus.clone(),
                load: vec![0; n.cpus.len()],
            })
            .collect();

        if nodes.is_empty() {
            let fallback = num_cpus::get().max(1);
            nodes.push(NodeLoad {
                node_id: 0,
                cpus: (0..fallback).collect(),
                load: vec![0; fallback],
            });
        }

        tracing::info!(
            "distributing {} threads to {} NUMA node(s)",
            num_threads,
            nodes.len()
        );

        let mut target_cpus = Vec::with_capacity(num_threads);
        while target_cpus.len() < num_threads {
            for node in nodes.iter_mut() {
                if target_cpus.len() >= num_threads {
                    break;
                }
                target_cpus.push(node.place_thread(smt_siblings, cache_siblings));
            }
        }

        for node in &nodes {
            tracing::info!("node {}: load {}", node.node_id, node.max_load());
        }

        ThreadDistributor { target_cpus }
    }

    /// Pin the calling thread to the CPU assigned to `thread_idx` and set
    /// its memory allocation policy to local.
    pub fn pin_this_thread(&self, thread_idx: usize) -> Result<()> {
        let cpu = *self.target_cpus.get(thread_idx).ok_or_else(|| {
            DismecError::resource(format!("no CPU assigned for thread {thread_idx}"))
        })?;

        #[cfg(feature = "thread-pinning")]
        {
            let id = core_affinity::CoreId { id: cpu };
            if !core_affinity::set_for_current(id) {
                return Err(DismecError::resource(format!(
                    "failed to pin thread {thread_idx} to CPU {cpu}"
                )));
            }
        }
        #[cfg(not(feature = "thread-pinning"))]
        {
            let _ = cpu;
        }

        tracing::info!("pinned thread {} to CPU {}", thread_idx, cpu);
        Ok(())
    }
}

#[cfg(feature = "numa")]
fn hwloc_sibling_queries() -> (impl Fn(usize) -> Vec<usize>, impl Fn(usize) -> Vec<usize>) {
    use std::collections::HashMap;

    let topology = Topology::new().ok();

    let smt: HashMap<usize, Vec<usize>> = topology
        .as_ref()
        .map(|t| siblings_by_object_type(t, ObjectType::Core))
        .unwrap_or_default();

    let mut cache = HashMap::<usize, Vec<usize>>::new();
    if let Some(t) = topology.as_ref() {
        for ty in [ObjectType::L1Cache, ObjectType::L2Cache, ObjectType::L3Cache] {
            for (cpu, sibs) in siblings_by_object_type(t, ty) {
                cache.entry(cpu).or_default().extend(sibs);
            }
        }
    }

    (
        move |cpu: usize| smt.get(&cpu).cloned().unwrap_or_default(),
        move |cpu: usize| cache.get(&cpu).cloned().unwrap_or_default(),
    )
}

#[cfg(feature = "numa")]
fn siblings_by_object_type(
    topology: &Topology,
    ty: ObjectType,
) -> std::collections::HashMap<usize, Vec<usize>> {
    use std::collections::HashMap;

    let num_pus = topology.objects_with_type(ObjectType::PU).count();
    let mut map = HashMap::new();
    for obj in topology.objects_with_type(ty) {
        let Some(cpuset) = obj.cpuset() else {
            continue;
        };
        let members: Vec<usize> = (0..num_pus).filter(|&cpu| cpuset.is_set(cpu)).collect();
        for &cpu in &members {
            let siblings: Vec<usize> = members.iter().copied().filter(|&c| c != cpu).collect();
            map.insert(cpu, siblings);
        }
    }
    map
}
