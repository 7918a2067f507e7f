//! 三维几何基础：点 / 向量与欧氏距离

/// 三维点或向量（x, y, z），单位：米
pub type Vec3 = [f64; 3];

/// 两点之间的欧氏距离
pub fn distance(a: &Vec3, b: &Vec3) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// a - b
pub fn sub(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn norm(v: &Vec3) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// 是否三个分量都是有限数（LLM 返回的航点需要校验）
pub fn is_finite(v: &Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}
