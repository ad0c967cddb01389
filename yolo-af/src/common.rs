pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use bbox::{prelude::*, Xyxy};
pub use getset::{CopyGetters, Getters};
pub use itertools::{izip, Itertools as _};
#[cfg(feature = "profiling")]
pub use lazy_static::lazy_static;
pub use log::{info, warn};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    collections::HashSet,
    fmt,
    sync::Mutex,
    time::{Duration, Instant},
};
pub use tch::{Device, Kind, Reduction, Tensor};
pub use tch_goodies::{TensorExt as _, XyxyTensor};
pub use tch_tensor_like::TensorLike;

pub type Fallible<T> = Result<T, Error>;

unzip_n::unzip_n!(pub 5);
