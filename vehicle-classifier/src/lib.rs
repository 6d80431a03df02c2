//! # Vehicle classifier
//!
//! Image-to-prediction pipeline for a pre-trained vehicle type classifier.
//!
//! An uploaded image goes through the [`service::prepare`] preprocessor, the resulting
//! [`tensor::InputTensor`] is fed to an inference [`providers::Provider`] and the
//! top scoring class is mapped to a label of the [`service::labels::LabelSet`].
//!
//! ```no_run
//! use vehicle_classifier::service::{Config, ServiceBuilder};
//!
//! let service = ServiceBuilder::new("models/vehicle.onnx".into())
//!     .config(Config::default())
//!     .build()
//!     .expect("the model could not be loaded");
//!
//! let bytes = std::fs::read("truck.jpg").unwrap();
//! println!("{}", service.classify_image(&bytes));
//! ```
pub mod providers;
pub mod service;
pub mod tensor;
