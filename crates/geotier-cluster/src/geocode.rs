//! Offline geocoder: literal coordinates plus a configured gazetteer.

use std::collections::BTreeMap;

use geotier_core::GeoPoint;

use crate::traits::{GeocodedLocation, Geocoder};

#[derive(Debug, Clone, Default)]
pub struct StaticGeocoder {
    places: BTreeMap<String, GeoPoint>,
}

impl StaticGeocoder {
    pub fn new(places: BTreeMap<String, GeoPoint>) -> Self {
        Self { places }
    }
}

impl Geocoder for StaticGeocoder {
    fn geocode(&self, query: &str) -> Option<GeocodedLocation> {
        if let Ok(point) = GeoPoint::parse(query) {
            let display = self.reverse(point).unwrap_or_else(|| point.to_string());
            return Some(GeocodedLocation { point, display });
        }
        let wanted = query.trim();
        self.places
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(name, point)| GeocodedLocation {
                point: *point,
                display: name.clone(),
            })
    }

    fn reverse(&self, point: GeoPoint) -> Option<String> {
        self.places
            .iter()
            .find(|(_, p)| **p == point)
            .map(|(name, _)| name.clone())
    }
}
