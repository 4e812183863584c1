use itertools::Itertools;

use crate::{
    bounds::Bounds3f,
    bsdf::BSDF,
    bxdf::{BxDF, DiffuseBxDF, MirrorBxDF, PhongBxDF},
    color::RGB,
    float::PI_F,
    frame::Frame,
    path_guide::SurfaceHit,
    ray::{Ray, RAY_EPSILON},
    vecmath::{Normal3f, Point2f, Point3f, Vector3f},
    Float,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Material {
    Diffuse { albedo: RGB },
    Glossy { albedo: RGB, roughness: Float },
    Mirror { albedo: RGB },
}

impl Material {
    pub fn bsdf(&self, ns: Normal3f) -> BSDF {
        let bxdf = match *self {
            Material::Diffuse { albedo } => BxDF::Diffuse(DiffuseBxDF::new(albedo)),
            Material::Glossy { albedo, roughness } => BxDF::Phong(PhongBxDF::new(albedo, roughness)),
            Material::Mirror { albedo } => BxDF::Mirror(MirrorBxDF::new(albedo)),
        };
        BSDF::new(ns, bxdf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Point3f,
    pub radius: Float,
    pub material: Material,
    /// Radiance emitted from the outside of the sphere; non-zero makes it a light.
    pub emission: RGB,
}

impl Sphere {
    pub fn new(center: Point3f, radius: Float, material: Material) -> Sphere {
        Sphere {
            center,
            radius,
            material,
            emission: RGB::ZERO,
        }
    }

    pub fn light(center: Point3f, radius: Float, emission: RGB) -> Sphere {
        Sphere {
            center,
            radius,
            material: Material::Diffuse { albedo: RGB::ZERO },
            emission,
        }
    }

    pub fn is_light(&self) -> bool {
        !self.emission.is_zero()
    }

    pub fn bounds(&self) -> Bounds3f {
        let r = Vector3f::new(self.radius, self.radius, self.radius);
        Bounds3f::new(self.center - r, self.center + r)
    }

    /// Smallest ray parameter in (RAY_EPSILON, t_max) where the ray meets the sphere.
    /// The direction need not be normalized.
    pub fn intersect(&self, ray: &Ray, t_max: Float) -> Option<Float> {
        let oc = ray.o - self.center;
        let a = ray.d.length_squared();
        let half_b = oc.dot(&ray.d);
        let c = oc.length_squared() - self.radius * self.radius;
        let discriminant = half_b * half_b - a * c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        [(-half_b - root) / a, (-half_b + root) / a]
            .into_iter()
            .find(|t| *t > RAY_EPSILON && *t < t_max)
    }

    /// Cone of directions from p subtended by the sphere, as (axis, distance, 1 - cos(theta_max)).
    /// None if p lies inside.
    fn subtended_cone(&self, p: Point3f) -> Option<(Vector3f, Float, Float)> {
        let to_center = self.center - p;
        let d2 = to_center.length_squared();
        let r2 = self.radius * self.radius;
        if d2 <= r2 {
            return None;
        }
        let sin2 = r2 / d2;
        let cos_max = Float::sqrt(1.0 - sin2);
        let d = d2.sqrt();
        // 1 - cos computed without cancellation for small cones.
        Some((to_center / d, d, sin2 / (1.0 + cos_max)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub t: Float,
    pub hit: SurfaceHit,
    /// Index of the sphere that was hit.
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSample {
    pub wi: Vector3f,
    pub li: RGB,
    /// Solid-angle density, including the probability of choosing this light.
    pub pdf: Float,
    pub p_light: Point3f,
}

/// Pinhole camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    origin: Point3f,
    frame: Frame,
    tan_half_fov: Float,
}

impl Camera {
    /// fov is the vertical field of view in degrees.
    pub fn look_at(origin: Point3f, target: Point3f, fov: Float) -> Camera {
        let forward = (target - origin).normalize();
        let right = forward.cross(&Vector3f::Y).normalize();
        let up = right.cross(&forward);
        Camera {
            origin,
            frame: Frame::new(right, up, forward),
            tan_half_fov: Float::tan(fov.to_radians() / 2.0),
        }
    }

    /// Ray through pixel (x, y) of a width x height image, jittered within the pixel by u.
    pub fn generate_ray(&self, x: u32, y: u32, width: u32, height: u32, u: Point2f) -> Ray {
        let aspect = width as Float / height as Float;
        let sx = (2.0 * (x as Float + u.x) / width as Float - 1.0) * self.tan_half_fov * aspect;
        let sy = (1.0 - 2.0 * (y as Float + u.y) / height as Float) * self.tan_half_fov;
        let d = self.frame.from_local_v(&Vector3f::new(sx, sy, 1.0)).normalize();
        Ray::new(self.origin, d)
    }
}

/// A handful of spheres under a constant environment.
#[derive(Debug, Clone)]
pub struct Scene {
    spheres: Vec<Sphere>,
    lights: Vec<usize>,
    environment: RGB,
    camera: Camera,
    bounds: Bounds3f,
}

impl Scene {
    /// bounds limits the region the guiding field covers; geometry may extend past it.
    pub fn new(spheres: Vec<Sphere>, environment: RGB, camera: Camera, bounds: Bounds3f) -> Scene {
        let lights = spheres.iter().positions(|s| s.is_light()).collect_vec();
        Scene {
            spheres,
            lights,
            environment,
            camera,
            bounds,
        }
    }

    /// Spheres on a large floor, lit mostly by a small light tucked behind an occluder so
    /// that indirect paths carry most of the energy.
    pub fn demo() -> Scene {
        let white = RGB::splat(0.75);
        let spheres = vec![
            Sphere::new(
                Point3f::new(0.0, -1000.0, 0.0),
                1000.0,
                Material::Diffuse { albedo: white },
            ),
            Sphere::new(
                Point3f::new(-1.2, 0.6, 0.0),
                0.6,
                Material::Diffuse {
                    albedo: RGB::new(0.7, 0.3, 0.2),
                },
            ),
            Sphere::new(
                Point3f::new(0.0, 0.5, 0.6),
                0.5,
                Material::Glossy {
                    albedo: RGB::splat(0.8),
                    roughness: 0.3,
                },
            ),
            Sphere::new(
                Point3f::new(1.2, 0.6, 0.0),
                0.6,
                Material::Mirror {
                    albedo: RGB::splat(0.9),
                },
            ),
            // Occluder hanging above the light, hiding it from the camera.
            Sphere::new(
                Point3f::new(0.0, 3.2, -2.0),
                1.2,
                Material::Diffuse { albedo: white },
            ),
            Sphere::light(Point3f::new(0.0, 1.9, -2.0), 0.2, RGB::splat(60.0)),
        ];
        let camera = Camera::look_at(
            Point3f::new(0.0, 1.2, 5.0),
            Point3f::new(0.0, 0.6, 0.0),
            40.0,
        );
        let bounds = Bounds3f::new(Point3f::new(-4.0, -0.1, -4.0), Point3f::new(4.0, 4.5, 5.5));
        Scene::new(spheres, RGB::new(0.02, 0.02, 0.03), camera, bounds)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn environment(&self) -> RGB {
        self.environment
    }

    pub fn bounds(&self) -> Bounds3f {
        self.bounds
    }

    pub fn sphere(&self, index: usize) -> &Sphere {
        &self.spheres[index]
    }

    pub fn intersect(&self, ray: &Ray, t_max: Float) -> Option<Intersection> {
        let mut closest: Option<(Float, usize)> = None;
        for (i, sphere) in self.spheres.iter().enumerate() {
            let limit = closest.map_or(t_max, |(t, _)| t);
            if let Some(t) = sphere.intersect(ray, limit) {
                closest = Some((t, i));
            }
        }
        let (t, index) = closest?;
        let p = ray.at(t);
        let n = Normal3f::from((p - self.spheres[index].center).normalize());
        Some(Intersection {
            t,
            hit: SurfaceHit { p, n, ns: n },
            index,
        })
    }

    /// Whether the segment from the surface point to target is free of geometry.
    pub fn unoccluded(&self, hit: &SurfaceHit, target: Point3f) -> bool {
        let ray = Ray::spawn_to(hit.p, hit.n, target);
        self.intersect(&ray, 1.0 - 1e-3).is_none()
    }

    /// Picks a light uniformly and a direction uniformly inside the cone it subtends from p.
    pub fn sample_light(&self, p: Point3f, u: Float, u2: Point2f) -> Option<LightSample> {
        if self.lights.is_empty() {
            return None;
        }
        let n = self.lights.len();
        let index = self.lights[Float::min(u * n as Float, (n - 1) as Float) as usize];
        let light = &self.spheres[index];
        let (axis, _, one_minus_cos_max) = light.subtended_cone(p)?;

        let cos_theta = 1.0 - u2.x * one_minus_cos_max;
        let sin_theta = Float::sqrt(Float::max(0.0, 1.0 - cos_theta * cos_theta));
        let phi = 2.0 * PI_F * u2.y;
        let wi = Frame::from_z(axis)
            .from_local_v(&Vector3f::new(
                sin_theta * Float::cos(phi),
                sin_theta * Float::sin(phi),
                cos_theta,
            ))
            .normalize();
        let t = light
            .intersect(&Ray::new(p, wi), Float::INFINITY)
            .unwrap_or_else(|| (light.center - p).dot(&wi));
        Some(LightSample {
            wi,
            li: light.emission,
            pdf: 1.0 / (2.0 * PI_F * one_minus_cos_max * n as Float),
            p_light: p + wi * t,
        })
    }

    /// Density with which sample_light() picks the direction toward the given light from p.
    pub fn light_pdf(&self, p: Point3f, index: usize) -> Float {
        let light = &self.spheres[index];
        if !light.is_light() {
            return 0.0;
        }
        match light.subtended_cone(p) {
            Some((_, _, one_minus_cos_max)) => {
                1.0 / (2.0 * PI_F * one_minus_cos_max * self.lights.len() as Float)
            }
            None => 0.0,
        }
    }
}
