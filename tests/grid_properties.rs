use mesh_ddm::dofmap::{TdofOffsets, get_rank};
use mesh_ddm::partition::{RankAssignment, SubdomainPartition};
use mesh_ddm::prelude::*;
use mesh_ddm::topology::grid::{direction_id, direction_ijk};
use proptest::prelude::*;

fn grid_strategy() -> impl Strategy<Value = SubdomainGrid> {
    prop_oneof![
        (1usize..6, 1usize..6).prop_map(|(nx, ny)| SubdomainGrid::new(2, [nx, ny, 1]).unwrap()),
        (1usize..4, 1usize..4, 1usize..4)
            .prop_map(|(nx, ny, nz)| SubdomainGrid::new(3, [nx, ny, nz]).unwrap()),
    ]
}

#[test]
fn planar_ids_cover_zero_to_eight() {
    let mut ids: Vec<usize> = (-1..=1)
        .flat_map(|j| (-1..=1).map(move |i| direction_id([i, j, -1])))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..9).collect::<Vec<_>>());
    for id in 0..27 {
        assert_eq!(direction_id(direction_ijk(id)), id);
    }
}

proptest! {
    #[test]
    fn stepping_back_along_the_opposite_direction_returns(grid in grid_strategy(), pick in any::<prop::sample::Index>()) {
        let dim = grid.dim();
        let ip = pick.index(grid.num_subdomains());
        for d in grid.directions() {
            let back = d.opposite(dim);
            prop_assert_eq!(back.opposite(dim), d);
            prop_assert!(back.id() < grid.num_directions());
            if d.is_center(dim) {
                prop_assert_eq!(grid.neighbor(ip, d), Some(ip));
                continue;
            }
            if let Some(nb) = grid.neighbor(ip, d) {
                prop_assert_ne!(nb, ip);
                prop_assert_eq!(grid.neighbor(nb, back), Some(ip));
            }
        }
    }

    #[test]
    fn subdomain_coordinates_round_trip(grid in grid_strategy()) {
        for ip in 0..grid.num_subdomains() {
            let ijk = grid.subdomain_ijk(ip);
            for a in 0..3 {
                prop_assert!(ijk[a] < grid.extents()[a]);
            }
            prop_assert_eq!(grid.subdomain_id(ijk), ip);
        }
    }

    #[test]
    fn owner_is_monotone_in_the_true_dof(
        mut offs in prop::collection::vec(0u64..500, 1..9),
        a in 0u64..600,
        b in 0u64..600,
    ) {
        offs.sort_unstable();
        offs[0] = 0;
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(get_rank(lo, &offs) <= get_rank(hi, &offs));
        prop_assert!(get_rank(hi, &offs) < offs.len());
    }

    #[test]
    fn zero_overlap_partition_covers_every_element_once(
        nx in 2usize..7,
        ny in 2usize..7,
        gx in 1usize..3,
        gy in 1usize..3,
    ) {
        let mesh = CartesianMesh::unit(2, [nx, ny, 1]).unwrap();
        let grid = SubdomainGrid::new(2, [gx, gy, 1]).unwrap();
        let part = SubdomainPartition::cartesian(
            &mesh,
            grid,
            0,
            &RankAssignment::RoundRobin(1),
            0,
            0..nx * ny,
        )
        .unwrap();
        let mut seen = vec![0usize; nx * ny];
        for ip in 0..part.num_subdomains() {
            for &e in part.element_map(ip) {
                seen[e] += 1;
            }
        }
        prop_assert!(seen.iter().all(|&c| c == 1));
    }
}

#[test]
fn overlap_layers_grow_interior_subdomains() {
    let mesh = CartesianMesh::unit(2, [6, 6, 1]).unwrap();
    let grid = SubdomainGrid::new(2, [3, 3, 1]).unwrap();
    let part =
        SubdomainPartition::cartesian(&mesh, grid, 1, &RankAssignment::RoundRobin(2), 1, 18..36)
            .unwrap();
    // corner: 2x2 core plus one layer on two sides
    assert_eq!(part.element_map(0).len(), 9);
    // center: one layer on all four sides
    assert_eq!(part.element_map(4).len(), 16);
    assert_eq!(part.subdomain_ranks(), &[0, 1, 0, 1, 0, 1, 0, 1, 0]);
    assert!(part.owns(3) && !part.owns(4));
    assert!(part.subdomain_mesh(3).is_some());
    assert!(part.subdomain_mesh(4).is_none());
    assert!(
        part.local_element_map(4)
            .iter()
            .all(|e| (18..36).contains(e))
    );
}

#[test]
fn explicit_assignment_is_validated() {
    let mesh = CartesianMesh::unit(2, [4, 4, 1]).unwrap();
    let grid = SubdomainGrid::new(2, [2, 2, 1]).unwrap();
    let short = RankAssignment::Explicit {
        ranks: vec![0, 1, 0],
        num_ranks: 2,
    };
    assert!(SubdomainPartition::cartesian(&mesh, grid, 1, &short, 0, 0..16).is_err());
    let out_of_range = RankAssignment::Explicit {
        ranks: vec![0, 1, 2, 0],
        num_ranks: 2,
    };
    assert!(SubdomainPartition::cartesian(&mesh, grid, 1, &out_of_range, 0, 0..16).is_err());
}

#[test]
fn offsets_gather_on_four_ranks() {
    let counts = [5u64, 0, 7, 3];
    let tables = run_local_ranks(4, |comm| {
        let mine: u64 = counts[..comm.rank()].iter().sum();
        TdofOffsets::gather(&comm, mine).unwrap()
    });
    for t in &tables {
        assert_eq!(t.as_slice(), &[0, 5, 5, 12]);
        assert_eq!(t.num_ranks(), 4);
        assert_eq!(t.rank_of(4), 0);
        assert_eq!(t.rank_of(5), 2);
        assert_eq!(t.rank_of(14), 3);
    }
}
