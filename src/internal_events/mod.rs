#![allow(missing_docs)]

mod multiline;
mod process;
mod template;

pub(crate) use self::{multiline::*, process::*, template::*};
