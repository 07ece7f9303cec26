//! Computing over the full cloud and picking the processed points, computing
//! over an index subset, and computing over a copied sub-cloud against the
//! full cloud as search surface all give the same records. So does running
//! on a worker pool.

use nalgebra::Vector3;
use pcf_common::{
    point::{Data, Normal3, Point, Point3I, Point3L, Point3Rgba},
    point_cloud::PointCloud,
};
use pcf_features::*;
use pcf_search::KdTreeSearch;
use rand::{rngs::StdRng, Rng, SeedableRng};

const RADIUS: f32 = 0.2;

/// A noisy saddle with a smooth intensity field.
fn saddle() -> PointCloud<Point3I> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..24)
        .flat_map(|i| (0..24).map(move |j| (i, j)))
        .map(|(i, j)| {
            let x = i as f32 * 0.05 + rng.gen_range(-0.01..0.01);
            let y = j as f32 * 0.05 + rng.gen_range(-0.01..0.01);
            let z = 0.5 * (x - 0.6) * (y - 0.6) + rng.gen_range(-0.002..0.002);
            Point3I::new(x, y, z, (3. * x).sin() + y * y)
        })
        .collect()
}

fn indices() -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut indices = (0..40).map(|_| rng.gen_range(0..576)).collect::<Vec<usize>>();
    indices.extend([0, 23, 300, 575]);
    indices
}

fn normals<P: Point<Data = f32>>(cloud: &PointCloud<P>) -> PointCloud<Normal3> {
    Estimation::new()
        .with_input(cloud)
        .with_search_method(&KdTreeSearch)
        .with_k_search(10)
        .compute(&NormalEstimation::new(Vector3::new(0.6, 0.6, 10.)))
        .unwrap()
}

/// `Debug` tells NaN records apart from each other no better than from
/// themselves, so it serves as a NaN-tolerant equality.
fn same<D: Data>(a: &D, b: &D) -> bool {
    format!("{a:?}") == format!("{b:?}")
}

/// Runs `feature` all four ways with the same search and returns the
/// records of the processed points.
fn check<P, F>(cloud: &PointCloud<P>, feature: &F) -> PointCloud<F::Output>
where
    P: Point<Data = f32>,
    F: Feature<P>,
{
    let indices = indices();
    let search = KdTreeSearch;
    let estimation = || {
        Estimation::<P>::new()
            .with_search_method(&search)
            .with_radius_search(RADIUS)
    };

    let full = estimation().with_input(cloud).compute(feature).unwrap();
    assert_eq!(full.len(), cloud.len());

    let subset = estimation()
        .with_input(cloud)
        .with_indices(&indices[..])
        .compute(feature)
        .unwrap();
    assert_eq!(subset.len(), indices.len());

    let sub = cloud.create_sub(&indices, indices.len());
    let surface = estimation()
        .with_input(&sub)
        .with_search_surface(cloud)
        .compute(feature)
        .unwrap();
    assert_eq!(surface.len(), indices.len());

    let parallel = estimation()
        .with_input(cloud)
        .with_indices(&indices[..])
        .with_threads(4)
        .compute(feature)
        .unwrap();

    for (k, &i) in indices.iter().enumerate() {
        assert!(same(&full[i], &subset[k]), "{}: subset differs at {i}", F::NAME);
        assert!(same(&full[i], &surface[k]), "{}: search surface differs at {i}", F::NAME);
        assert!(same(&subset[k], &parallel[k]), "{}: pool differs at {i}", F::NAME);
    }
    subset
}

fn mostly_finite<D: Data>(output: &PointCloud<D>) {
    let finite = output.iter().filter(|record| record.is_finite()).count();
    assert!(finite * 4 >= output.len() * 3, "only {finite} of {} records are finite", output.len());
}

#[test]
fn test_surface_descriptors() {
    let cloud = saddle();
    let normals = normals(&cloud);

    mostly_finite(&check(&cloud, &NormalEstimation::<Normal3>::default()));
    mostly_finite(&check(&cloud, &MomentInvariant));
    mostly_finite(&check(
        &cloud,
        &PrincipalCurvaturesEstimation::new().with_normals(&normals),
    ));
    check(&cloud, &BoundaryEstimation::default().with_normals(&normals));
    mostly_finite(&check(&cloud, &RsdEstimation::default().with_normals(&normals)));
}

#[test]
fn test_histogram_descriptors() {
    let cloud = saddle();
    let normals = normals(&cloud);

    mostly_finite(&check(&cloud, &PfhEstimation::default().with_normals(&normals)));
    mostly_finite(&check(
        &cloud,
        &PfhEstimation::default().with_normals(&normals).with_cache_size(64),
    ));
    mostly_finite(&check(&cloud, &FpfhEstimation::default().with_normals(&normals)));
    mostly_finite(&check(&cloud, &ShotEstimation::default().with_normals(&normals)));
    mostly_finite(&check(
        &cloud,
        &SpinImageEstimation::default().with_normals(&normals),
    ));
    mostly_finite(&check(
        &cloud,
        &SpinImageEstimation::default()
            .with_normals(&normals)
            .with_flags(SpinImageFlags::RADIAL | SpinImageFlags::ANGULAR),
    ));

    let bins = ShapeContextBins {
        azimuth: 4,
        elevation: 4,
        radial: 4,
        min_radius: RADIUS / 10.,
        point_density_radius: RADIUS / 5.,
    };
    mostly_finite(&check(
        &cloud,
        &ShapeContext3DEstimation::new(bins).with_normals(&normals),
    ));
    mostly_finite(&check(&cloud, &UniqueShapeContext::new(bins)));
    mostly_finite(&check(&cloud, &UniqueShapeContext::new(bins).with_local_radius(RADIUS * 1.5)));

    let pairs = check(&cloud, &PpfEstimation::new().with_normals(&normals));
    assert!(pairs.iter().all(|row| row.len() == cloud.len()));
}

#[test]
fn test_color_descriptors() {
    let cloud = saddle().map(|point| {
        let shade = (point.intensity * 100.).clamp(0., 255.) as u32;
        let rgba = 0xff000000 | (shade << 16) | (0x40 << 8) | (255 - shade);
        Point3Rgba::new(point.coords.x, point.coords.y, point.coords.z, rgba)
    });
    let normals = normals(&cloud);

    mostly_finite(&check(&cloud, &ShotColorEstimation::default().with_normals(&normals)));
}

#[test]
fn test_intensity_descriptors() {
    let cloud = saddle();
    let normals = normals(&cloud);

    let gradients = Estimation::new()
        .with_input(&cloud)
        .with_search_method(&KdTreeSearch)
        .with_radius_search(RADIUS)
        .compute(&IntensityGradientEstimation::new().with_normals(&normals))
        .unwrap();
    mostly_finite(&gradients);

    check(&cloud, &IntensityGradientEstimation::new().with_normals(&normals));
    mostly_finite(&check(&cloud, &IntensitySpinEstimation::default()));
    mostly_finite(&check(&cloud, &IntensitySpinEstimation::new(4, 16, 0.)));
    mostly_finite(&check(&cloud, &RiftEstimation::default().with_gradients(&gradients)));
}

#[test]
fn test_gfpfh_is_deterministic() {
    let cloud = saddle().map(|point| {
        let column = (point.coords.x * 4.).clamp(0., 3.) as u32;
        let row = (point.coords.y * 2.).clamp(0., 1.) as u32;
        let label = 1 + column + 4 * row;
        Point3L::new(point.coords.x, point.coords.y, point.coords.z, label)
    });
    let gfpfh = GfpfhEstimation::new(0.1, 8);
    let estimation = Estimation::new().with_input(&cloud);

    let first = gfpfh.compute(&estimation).unwrap();
    let second = gfpfh.compute(&estimation).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].len(), 64);
    assert!(first[0].sum() > 0.);
}

#[test]
fn test_vfh_over_subsets() {
    let cloud = saddle();
    let normals = normals(&cloud);
    let indices = indices();
    let vfh = VfhEstimation::default()
        .with_normals(&normals)
        .with_viewpoint(Vector3::new(0.6, 0.6, 10.));

    let subset = vfh
        .compute(&Estimation::new().with_input(&cloud).with_indices(&indices[..]))
        .unwrap();
    let sub = cloud.create_sub(&indices, indices.len());
    let sub_normals = normals.create_sub(&indices, indices.len());
    let copied = VfhEstimation::default()
        .with_normals(&sub_normals)
        .with_viewpoint(Vector3::new(0.6, 0.6, 10.))
        .compute(&Estimation::new().with_input(&sub).with_search_surface(&cloud))
        .unwrap();
    assert_eq!(subset, copied);
    assert!(subset[0].iter().all(|v| v.is_finite()));

    let full = vfh.compute(&Estimation::new().with_input(&cloud)).unwrap();
    assert_eq!(full.len(), 1);
    assert_ne!(full, subset);
}
