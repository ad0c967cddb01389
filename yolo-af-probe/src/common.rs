//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use futures::future;
pub use itertools::Itertools;
pub use log::{error, info, warn};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng};
pub use serde::{Deserialize, Serialize};
pub use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
};
pub use tch::{Device, Kind, Tensor};
pub use tch_goodies::TensorExt as _;

pub type Fallible<T> = Result<T, Error>;
