//! Bin-packing of service instances onto worker nodes.
//!
//! Purely functional: immutable inputs in, a fresh assignment out. Services
//! are considered in input order, which makes every run over the same input
//! produce the same mapping.

use std::collections::HashMap;

use models::models::placement::{InstanceRef, PlacementOutcome, ServiceDemand, WorkerCapacity};

/// Capacity assumed per node when estimating how many nodes an empty fleet
/// would need.
pub const DEFAULT_NODE_CAPACITY: WorkerCapacity = WorkerCapacity {
    cpu: 20,
    memory: 24,
};

/// Assign every `(service, instance)` pair to a worker.
///
/// Fat services go first: pairs are ordered by the owning service's total
/// demand (`cpu*instances + memory*instances`) descending, ties keeping
/// input order. Each pair lands on the node with the smallest projected
/// usage among those that can still fit it, ties broken by ascending node
/// index. Pairs that fit nowhere are reported, not fatal.
pub fn plan(
    workers: &[WorkerCapacity],
    services: &[(String, ServiceDemand)],
    default_capacity: &WorkerCapacity,
) -> PlacementOutcome {
    if workers.is_empty() {
        return PlacementOutcome {
            assignments: Vec::new(),
            unplaced: flatten(services),
            nodes_needed: Some(nodes_needed(services, default_capacity)),
        };
    }

    let demand_of: HashMap<&str, &ServiceDemand> = services
        .iter()
        .map(|(name, demand)| (name.as_str(), demand))
        .collect();
    let total_of: HashMap<&str, u64> = services
        .iter()
        .map(|(name, demand)| {
            let instances = u64::from(demand.instances);
            (
                name.as_str(),
                demand.cpu * instances + demand.memory * instances,
            )
        })
        .collect();

    // Stable sort keeps input order for equal-weight services.
    let mut pairs = flatten(services);
    pairs.sort_by(|a, b| {
        total_of[b.service.as_str()].cmp(&total_of[a.service.as_str()])
    });

    let mut used = vec![(0u64, 0u64); workers.len()];
    let mut assignments: Vec<Vec<InstanceRef>> = vec![Vec::new(); workers.len()];
    let mut unplaced = Vec::new();

    for pair in pairs {
        let demand = demand_of[pair.service.as_str()];
        let mut best: Option<usize> = None;
        let mut best_usage = u64::MAX;
        for (index, node) in workers.iter().enumerate() {
            let (cpu_used, memory_used) = used[index];
            if node.cpu >= cpu_used + demand.cpu && node.memory >= memory_used + demand.memory {
                let projected = cpu_used + demand.cpu + memory_used + demand.memory;
                if projected < best_usage {
                    best_usage = projected;
                    best = Some(index);
                }
            }
        }
        match best {
            Some(index) => {
                used[index].0 += demand.cpu;
                used[index].1 += demand.memory;
                assignments[index].push(pair);
            }
            None => unplaced.push(pair),
        }
    }

    PlacementOutcome {
        assignments,
        unplaced,
        nodes_needed: None,
    }
}

/// Nodes required to hold the aggregate demand at the given per-node
/// capacity: `ceil(max(total_cpu / cap.cpu, total_memory / cap.memory))`.
pub fn nodes_needed(services: &[(String, ServiceDemand)], capacity: &WorkerCapacity) -> u64 {
    let mut total_cpu = 0u64;
    let mut total_memory = 0u64;
    for (_, demand) in services {
        let instances = u64::from(demand.instances);
        total_cpu += demand.cpu * instances;
        total_memory += demand.memory * instances;
    }
    let cpu_per_node = capacity.cpu.max(1);
    let memory_per_node = capacity.memory.max(1);
    let for_cpu = total_cpu.div_ceil(cpu_per_node);
    let for_memory = total_memory.div_ceil(memory_per_node);
    for_cpu.max(for_memory)
}

fn flatten(services: &[(String, ServiceDemand)]) -> Vec<InstanceRef> {
    let mut pairs = Vec::new();
    for (name, demand) in services {
        for instance in 0..demand.instances {
            pairs.push(InstanceRef {
                service: name.clone(),
                instance,
            });
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand(cpu: u64, memory: u64, instances: u32) -> ServiceDemand {
        ServiceDemand {
            cpu,
            memory,
            instances,
        }
    }

    fn services() -> Vec<(String, ServiceDemand)> {
        vec![
            ("service_a".to_string(), demand(3, 5, 2)),
            ("service_b".to_string(), demand(2, 3, 3)),
        ]
    }

    #[test]
    fn every_instance_lands_within_capacity() {
        let workers = vec![
            WorkerCapacity { cpu: 20, memory: 24 },
            WorkerCapacity { cpu: 20, memory: 24 },
        ];
        let outcome = plan(&workers, &services(), &DEFAULT_NODE_CAPACITY);

        assert!(outcome.unplaced.is_empty());
        assert!(outcome.nodes_needed.is_none());
        let placed: usize = outcome.assignments.iter().map(Vec::len).sum();
        assert_eq!(placed, 5);

        for (index, node) in outcome.assignments.iter().enumerate() {
            let mut cpu = 0;
            let mut memory = 0;
            for pair in node {
                let demand = match pair.service.as_str() {
                    "service_a" => demand(3, 5, 2),
                    _ => demand(2, 3, 3),
                };
                cpu += demand.cpu;
                memory += demand.memory;
            }
            assert!(cpu <= workers[index].cpu);
            assert!(memory <= workers[index].memory);
        }
    }

    #[test]
    fn same_input_same_assignment() {
        let workers = vec![
            WorkerCapacity { cpu: 20, memory: 50 },
            WorkerCapacity { cpu: 28, memory: 30 },
            WorkerCapacity { cpu: 22, memory: 50 },
        ];
        let mut all = services();
        all.push(("service_c".to_string(), demand(5, 8, 4)));
        let first = plan(&workers, &all, &DEFAULT_NODE_CAPACITY);
        let second = plan(&workers, &all, &DEFAULT_NODE_CAPACITY);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
        assert!(first.unplaced.is_empty());
    }

    #[test]
    fn fat_services_are_placed_first() {
        // service_c's total demand (52) dwarfs the others, so its instances
        // must be assigned before any of service_b's.
        let workers = vec![WorkerCapacity {
            cpu: 100,
            memory: 100,
        }];
        let mut all = services();
        all.push(("service_c".to_string(), demand(5, 8, 4)));
        let outcome = plan(&workers, &all, &DEFAULT_NODE_CAPACITY);
        let order: Vec<&str> = outcome.assignments[0]
            .iter()
            .map(|pair| pair.service.as_str())
            .collect();
        assert_eq!(order[0], "service_c");
        assert_eq!(order[4], "service_a");
        assert_eq!(order[6], "service_b");
    }

    #[test]
    fn oversized_instances_are_reported_not_fatal() {
        let workers = vec![WorkerCapacity { cpu: 4, memory: 4 }];
        let all = vec![("bulky".to_string(), demand(3, 3, 2))];
        let outcome = plan(&workers, &all, &DEFAULT_NODE_CAPACITY);
        let placed: usize = outcome.assignments.iter().map(Vec::len).sum();
        assert_eq!(placed, 1);
        assert_eq!(outcome.unplaced.len(), 1);
        assert_eq!(outcome.unplaced[0].service, "bulky");
    }

    #[test]
    fn empty_workers_reports_feasibility_estimate() {
        let outcome = plan(&[], &services(), &DEFAULT_NODE_CAPACITY);
        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.unplaced.len(), 5);
        // Totals: cpu 12, memory 19 over {20, 24} per node.
        assert_eq!(outcome.nodes_needed, Some(1));
    }

    #[test]
    fn nodes_needed_rounds_up() {
        let all = vec![
            ("service_a".to_string(), demand(10, 2, 4)),
            ("service_b".to_string(), demand(1, 12, 2)),
        ];
        // cpu 42/20 -> 3, memory 32/24 -> 2.
        assert_eq!(nodes_needed(&all, &DEFAULT_NODE_CAPACITY), 3);
    }
}
