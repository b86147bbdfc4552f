//! Named EPSG constants used throughout the test suite and default connector configuration.

use super::Epsg;

pub const WGS84: Epsg = Epsg::new(4326);
pub const WGS84_WEB_MERCATOR: Epsg = Epsg::new(3857);
pub const BELGIAN_LAMBERT72: Epsg = Epsg::new(31370);
pub const ETRS89_LAEA_EUROPE: Epsg = Epsg::new(3035);
