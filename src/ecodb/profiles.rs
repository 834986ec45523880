use itertools::Itertools;
use rusqlite::OptionalExtension;

use crate::{
    ecodb::{conversion_error, DBResult, Database},
    gamify::{GamifyError, GamifyResult},
    models::{self, UserId},
};

/// Mean Earth radius used for great-circle distances.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Most profiles a username search returns.
const SEARCH_LIMIT: usize = 10;

pub const MAX_USERNAME_LENGTH: usize = 32;
pub const MAX_BIO_LENGTH: usize = 280;
pub const MAX_URL_LENGTH: usize = 512;

/// Every profile column plus the derived post/follow totals.
const PROFILE_SELECT: &str =
    "SELECT p.*,
        (SELECT COUNT(*) FROM Posts   WHERE user_id      = p.user_id) AS posts_count,
        (SELECT COUNT(*) FROM Follows WHERE following_id = p.user_id) AS followers_count,
        (SELECT COUNT(*) FROM Follows WHERE follower_id  = p.user_id) AS following_count
     FROM Profiles p";

/////*============== PROFILE QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::Profile {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            username: row.get("username")?,
            bio: row.get("bio")?,
            location: row.get("location")?,
            avatar_url: row.get("avatar_url")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            counts: models::ProfileCounts {
                posts: row.get("posts_count")?,
                followers: row.get("followers_count")?,
                following: row.get("following_count")?,
            },
        })
    }
}

impl Database {
    /// Returns the profile for `user_id`, if they have one.
    pub fn query_profile(&self, user_id: &UserId) -> DBResult<Option<models::Profile>> {
        log::trace!("[query_profile] Querying profile for {user_id}...");
        let connection = self.connect()?;

        connection
            .prepare(&format!("{PROFILE_SELECT} WHERE p.user_id = :user_id"))?
            .query_row(rusqlite::named_params! { ":user_id": user_id.as_str() }, |row| {
                models::Profile::try_from(row)
            })
            .optional()
    }

    /// Creates or replaces the profile for `user_id`. `counts` is ignored.
    pub fn upsert_profile(&self, user_id: &UserId, profile: &models::Profile) -> GamifyResult<()> {
        validate_profile(profile)?;

        let connection = self.connect()?;
        let query_params = rusqlite::named_params! {
                ":user_id":   user_id.as_str(),
                ":username":  profile.username.trim(),
                ":bio":       profile.bio,
                ":location":  profile.location,
                ":avatar_url": profile.avatar_url,
                ":latitude":  profile.latitude,
                ":longitude": profile.longitude,
        };

        connection
            .prepare(
                "INSERT INTO Profiles ( user_id,  username,  bio,  location,  avatar_url,  latitude,  longitude)
                 VALUES               (:user_id, :username, :bio, :location, :avatar_url, :latitude, :longitude)
                 ON CONFLICT (user_id) DO UPDATE SET
                    username   = excluded.username,
                    bio        = excluded.bio,
                    location   = excluded.location,
                    avatar_url = excluded.avatar_url,
                    latitude   = excluded.latitude,
                    longitude  = excluded.longitude",
            )?
            .execute(query_params)
            .inspect_err(|err| log::error!("[upsert_profile] Could not save profile for {user_id}: {err}"))?;

        log::info!("Profile for {user_id} saved as '{}'.", profile.username.trim());
        Ok(())
    }

    /// Looks up the display name for `user_id`.
    ///
    /// A missing profile, a blank username, or a failed read are all
    /// resolution failures.
    pub fn resolve_name(&self, user_id: &UserId) -> GamifyResult<String> {
        match self.query_profile(user_id) {
            Ok(Some(profile)) if !profile.username.trim().is_empty() => Ok(profile.username),
            Ok(_) => Err(GamifyError::NameResolutionFailure(user_id.to_string())),
            Err(err) => {
                log::error!("[resolve_name] Could not read profile for {user_id}: {err}");
                Err(GamifyError::NameResolutionFailure(user_id.to_string()))
            }
        }
    }

    /// Case-insensitive substring search over usernames. `%` and `_` match literally.
    pub fn search_profiles(&self, query: &str) -> DBResult<Vec<(UserId, models::Profile)>> {
        let connection = self.connect()?;
        let pattern = format!("%{}%", escape_like(&query.trim().to_lowercase()));

        let mut stmt = connection.prepare(&format!(
            "{PROFILE_SELECT}
             WHERE lower(p.username) LIKE :pattern ESCAPE '\\'
             ORDER BY p.username
             LIMIT :limit",
        ))?;

        let profiles = stmt
            .query_map(
                rusqlite::named_params! { ":pattern": pattern, ":limit": SEARCH_LIMIT },
                profile_with_id,
            )?
            .collect::<DBResult<Vec<_>>>()?;

        Ok(profiles)
    }

    /// Every profile within `radius_km` of the given point, nearest first.
    ///
    /// `exclude` (usually the caller) is left out of the results.
    pub fn find_nearby_users(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        exclude: Option<&UserId>,
    ) -> GamifyResult<Vec<models::NearbyUser>> {
        validate_coordinates(Some(latitude), Some(longitude))?;
        if !(radius_km.is_finite() && radius_km > 0.0) {
            return Err(GamifyError::InvalidInput(format!("radius must be positive, got {radius_km}")));
        }

        log::trace!("[find_nearby_users] Searching {radius_km} km around ({latitude}, {longitude}).");
        let connection = self.connect()?;
        let mut stmt = connection.prepare(&format!(
            "{PROFILE_SELECT} WHERE p.latitude IS NOT NULL AND p.longitude IS NOT NULL",
        ))?;

        let located = stmt
            .query_map([], profile_with_id)?
            .collect::<DBResult<Vec<_>>>()?;

        let nearby = located
            .into_iter()
            .filter(|(user_id, _)| Some(user_id) != exclude)
            .filter_map(|(user_id, profile)| {
                let distance = haversine_km(latitude, longitude, profile.latitude?, profile.longitude?);
                (distance <= radius_km).then(|| models::NearbyUser {
                    user_id,
                    username: profile.username,
                    distance_km: (distance * 10.0).round() / 10.0,
                })
            })
            .sorted_by(|a, b| a.distance_km.total_cmp(&b.distance_km))
            .collect();

        Ok(nearby)
    }
}

fn profile_with_id(row: &rusqlite::Row) -> DBResult<(UserId, models::Profile)> {
    let user_id = UserId::parse(&row.get::<_, String>("user_id")?)
        .map_err(|err| conversion_error(0, err))?;

    Ok((user_id, models::Profile::try_from(row)?))
}

fn validate_profile(profile: &models::Profile) -> GamifyResult<()> {
    let username = profile.username.trim();
    if username.is_empty() {
        return Err(GamifyError::InvalidInput(String::from("username must not be empty")));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(GamifyError::InvalidInput(format!(
            "username must be at most {MAX_USERNAME_LENGTH} characters"
        )));
    }
    if profile.bio.chars().count() > MAX_BIO_LENGTH {
        return Err(GamifyError::InvalidInput(format!("bio must be at most {MAX_BIO_LENGTH} characters")));
    }
    if profile.avatar_url.as_ref().is_some_and(|url| url.chars().count() > MAX_URL_LENGTH) {
        return Err(GamifyError::InvalidInput(format!("avatar url must be at most {MAX_URL_LENGTH} characters")));
    }

    validate_coordinates(profile.latitude, profile.longitude)
}

/// Escapes `LIKE` wildcards so they match themselves under `ESCAPE '\'`.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> GamifyResult<()> {
    match (latitude, longitude) {
        (None, None) => Ok(()),
        (Some(lat), Some(lon)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) => Ok(()),
        (Some(lat), Some(lon)) => Err(GamifyError::InvalidInput(format!(
            "coordinates out of range: ({lat}, {lon})"
        ))),
        _ => Err(GamifyError::InvalidInput(String::from(
            "latitude and longitude must be given together"
        ))),
    }
}

/// Great-circle distance between two points, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecodb::testing::temp_database;

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn located(username: &str, lat: f64, lon: f64) -> models::Profile {
        models::Profile {
            username: String::from(username),
            latitude: Some(lat),
            longitude: Some(lon),
            ..Default::default()
        }
    }

    #[test]
    fn haversine_matches_known_distances() {
        assert_eq!(haversine_km(12.97, 77.59, 12.97, 77.59), 0.0);

        // Paris to London is roughly 344 km.
        let paris_london = haversine_km(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((paris_london - 344.0).abs() < 2.0, "{paris_london}");
    }

    #[test]
    fn profile_round_trips_and_updates() {
        let (database, _dir) = temp_database();
        let alice = user("alice");

        database.upsert_profile(&alice, &models::Profile {
            username: String::from("alice"),
            bio: String::from("composting enjoyer"),
            ..Default::default()
        }).unwrap();
        database.upsert_profile(&alice, &located("alice_g", 10.0, 20.0)).unwrap();

        let profile = database.query_profile(&alice).unwrap().unwrap();
        assert_eq!(profile.username, "alice_g");
        assert_eq!(profile.bio, "");
        assert_eq!(profile.latitude, Some(10.0));
    }

    #[test]
    fn invalid_profiles_are_rejected_before_writing() {
        let (database, _dir) = temp_database();

        let blank = database.upsert_profile(&user("x"), &models::Profile::default());
        assert!(matches!(blank, Err(GamifyError::InvalidInput(_))));

        let off_the_map = database.upsert_profile(&user("x"), &located("x", 91.0, 0.0));
        assert!(matches!(off_the_map, Err(GamifyError::InvalidInput(_))));

        let half = database.upsert_profile(&user("x"), &models::Profile {
            username: String::from("x"),
            latitude: Some(1.0),
            ..Default::default()
        });
        assert!(matches!(half, Err(GamifyError::InvalidInput(_))));

        assert_eq!(database.query_profile(&user("x")).unwrap(), None);
    }

    #[test]
    fn resolve_name_fails_without_a_profile() {
        let (database, _dir) = temp_database();
        database.upsert_profile(&user("known"), &located("Known", 0.0, 0.0)).unwrap();

        assert_eq!(database.resolve_name(&user("known")).unwrap(), "Known");
        assert!(matches!(
            database.resolve_name(&user("ghost")),
            Err(GamifyError::NameResolutionFailure(_))
        ));
    }

    #[test]
    fn search_is_case_insensitive() {
        let (database, _dir) = temp_database();
        database.upsert_profile(&user("1"), &located("GreenGuy", 0.0, 0.0)).unwrap();
        database.upsert_profile(&user("2"), &located("recycler", 0.0, 0.0)).unwrap();

        let found = database.search_profiles("green").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, user("1"));
    }

    #[test]
    fn nearby_users_are_filtered_and_sorted() {
        let (database, _dir) = temp_database();
        // Around Bengaluru.
        database.upsert_profile(&user("me"), &located("me", 12.9716, 77.5946)).unwrap();
        database.upsert_profile(&user("far"), &located("far", 12.9716, 78.0)).unwrap();
        database.upsert_profile(&user("near"), &located("near", 12.98, 77.60)).unwrap();
        database.upsert_profile(&user("mumbai"), &located("mumbai", 19.076, 72.8777)).unwrap();
        database.upsert_profile(&user("nowhere"), &models::Profile {
            username: String::from("nowhere"),
            ..Default::default()
        }).unwrap();

        let nearby = database
            .find_nearby_users(12.9716, 77.5946, 50.0, Some(&user("me")))
            .unwrap();

        let names = nearby.iter().map(|n| n.username.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["near", "far"]);
        assert!(nearby[0].distance_km < nearby[1].distance_km);
    }

    #[test]
    fn nearby_rejects_bad_input() {
        let (database, _dir) = temp_database();

        assert!(matches!(
            database.find_nearby_users(0.0, 200.0, 10.0, None),
            Err(GamifyError::InvalidInput(_))
        ));
        assert!(matches!(
            database.find_nearby_users(0.0, 0.0, 0.0, None),
            Err(GamifyError::InvalidInput(_))
        ));
    }

    #[test]
    fn oversized_profile_fields_are_rejected() {
        let (database, _dir) = temp_database();

        let long_name = located(&"n".repeat(MAX_USERNAME_LENGTH + 1), 0.0, 0.0);
        assert!(matches!(
            database.upsert_profile(&user("x"), &long_name),
            Err(GamifyError::InvalidInput(_))
        ));

        let long_bio = models::Profile {
            username: String::from("x"),
            bio: "b".repeat(MAX_BIO_LENGTH + 1),
            ..Default::default()
        };
        assert!(matches!(
            database.upsert_profile(&user("x"), &long_bio),
            Err(GamifyError::InvalidInput(_))
        ));

        // Exactly at the limit is fine, multi-byte characters count once.
        let at_limit = located(&"é".repeat(MAX_USERNAME_LENGTH), 0.0, 0.0);
        database.upsert_profile(&user("x"), &at_limit).unwrap();
        assert_eq!(database.resolve_name(&user("x")).unwrap().chars().count(), MAX_USERNAME_LENGTH);
    }

    #[test]
    fn search_wildcards_match_literally() {
        let (database, _dir) = temp_database();
        database.upsert_profile(&user("1"), &located("green_guy", 0.0, 0.0)).unwrap();
        database.upsert_profile(&user("2"), &located("greenXguy", 0.0, 0.0)).unwrap();
        database.upsert_profile(&user("3"), &located("100%recycled", 0.0, 0.0)).unwrap();

        assert!(database.search_profiles("%").unwrap().iter().all(|(id, _)| *id == user("3")));
        assert_eq!(database.search_profiles("%").unwrap().len(), 1);

        let underscored = database.search_profiles("n_g").unwrap();
        assert_eq!(underscored.len(), 1);
        assert_eq!(underscored[0].1.username, "green_guy");

        assert!(database.search_profiles("\\").unwrap().is_empty());
        assert_eq!(escape_like(r"a%b_c\d"), r"a\%b\_c\\d");
    }

    #[test]
    fn profiles_report_post_and_follow_counts() {
        let (database, _dir) = temp_database();
        database.upsert_profile(&user("a"), &models::Profile {
            username: String::from("a"),
            avatar_url: Some(String::from("https://cdn.example/a.png")),
            ..Default::default()
        }).unwrap();

        database.follow(&user("b"), &user("a")).unwrap();
        database.follow(&user("c"), &user("a")).unwrap();
        database.follow(&user("a"), &user("b")).unwrap();
        database.create_post(&user("a"), &models::NewPost {
            content: String::from("hello"),
            image_url: None,
            tags: Vec::new(),
            is_public: true,
        }).unwrap();

        let profile = database.query_profile(&user("a")).unwrap().unwrap();
        assert_eq!(profile.counts, models::ProfileCounts { posts: 1, followers: 2, following: 1 });
        assert_eq!(profile.avatar_url.as_deref(), Some("https://cdn.example/a.png"));
        assert!(profile.to_string().contains("1 post(s) | 2 follower(s) | 1 following"));
    }
}
