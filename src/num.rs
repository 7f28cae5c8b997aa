pub type Number = f64;

pub type Point2 = nalgebra::Point2<Number>;
pub type Point3 = nalgebra::Point3<Number>;

pub type Vector2 = nalgebra::Vector2<Number>;
pub type Vector3 = nalgebra::Vector3<Number>;
pub type Vector4 = nalgebra::Vector4<Number>;

pub type Matrix3 = nalgebra::Matrix3<Number>;
pub type Matrix3x4 = nalgebra::Matrix3x4<Number>;
