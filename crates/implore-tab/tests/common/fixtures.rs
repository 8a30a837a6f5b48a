//! Table builders shared by the integration tests

use implore_tab::TableTransform;

/// Route `tracing` output through the test harness; safe to call repeatedly
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// One axis, `K = [4]`, default index `1..=4`, coordinates `10, 20, 30, 40`
#[allow(dead_code)]
pub fn table_1d() -> TableTransform {
    let mut tab = TableTransform::initialize(1, &[4]).unwrap();
    tab.set_coordinate_array(vec![10.0, 20.0, 30.0, 40.0]);
    tab
}

/// Fill the coordinate array from `f` evaluated at each vertex's index values.
///
/// Element `m` is fastest, then `k0`, `k1`, ...
#[allow(dead_code)]
pub fn fill(tab: &mut TableTransform, f: impl Fn(&[f64]) -> Vec<f64>) {
    let k = tab.table_length().to_vec();
    let m_count = k.len();
    let nc: usize = k.iter().product();

    let mut coord = Vec::with_capacity(nc * m_count);
    let mut psi = vec![0.0; m_count];
    for linear in 0..nc {
        let mut rest = linear;
        for m in 0..m_count {
            psi[m] = tab.index_vector(m).unwrap()[rest % k[m]];
            rest /= k[m];
        }
        let world = f(&psi);
        assert_eq!(world.len(), m_count);
        coord.extend(world);
    }
    tab.set_coordinate_array(coord);
}

/// Smooth, injective map used for 2-axis tables
#[allow(dead_code)]
pub fn warp_2d(psi: &[f64]) -> Vec<f64> {
    let (x, y) = (psi[0], psi[1]);
    vec![2.0 * x + 0.3 * y + 0.05 * x * y, 0.2 * x + 1.5 * y - 0.02 * x * y]
}

/// Two axes on non-uniform index vectors, filled from [`warp_2d`]
#[allow(dead_code)]
pub fn table_2d() -> TableTransform {
    let mut tab = TableTransform::initialize(2, &[4, 3]).unwrap();
    tab.set_index_vector(0, vec![0.0, 1.5, 2.0, 4.0]).unwrap();
    tab.set_index_vector(1, vec![-1.0, 0.0, 2.5]).unwrap();
    fill(&mut tab, warp_2d);
    tab
}

/// Three axes; axis 1 runs with a decreasing index vector
#[allow(dead_code)]
pub fn table_3d() -> TableTransform {
    let mut tab = TableTransform::initialize(3, &[3, 4, 2]).unwrap();
    tab.set_index_vector(0, vec![1.0, 2.0, 3.5]).unwrap();
    tab.set_index_vector(1, vec![9.0, 7.0, 4.0, 0.0]).unwrap();
    tab.set_index_vector(2, vec![0.0, 1.0]).unwrap();
    fill(&mut tab, |p| {
        vec![
            p[0] + 0.1 * p[1],
            -0.5 * p[1] + 0.05 * p[2],
            p[2] + 0.2 * p[0] + 0.01 * p[0] * p[1],
        ]
    });
    tab
}

/// Two axes, `K = [2, 2]`: a unit square mapped onto a parallelogram
#[allow(dead_code)]
pub fn table_2x2() -> TableTransform {
    let mut tab = TableTransform::initialize(2, &[2, 2]).unwrap();
    tab.set_coordinate_array(vec![
        0.0, 0.0, // (0, 0)
        10.0, 1.0, // (1, 0)
        2.0, 5.0, // (0, 1)
        12.0, 6.0, // (1, 1)
    ]);
    tab
}
